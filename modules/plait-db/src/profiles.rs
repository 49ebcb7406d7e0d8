//! Profiles: one row per DID plus bounded child sets (5 links, 2 vanity
//! stats, 6 pinned repos). The whole shape is replaced atomically on
//! upsert.

use plait_common::Page;
use sqlx::FromRow;

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::Db;

pub const MAX_LINKS: usize = 5;
pub const MAX_STATS: usize = 2;
pub const MAX_PINS: usize = 6;

/// The closed set of vanity stats a profile may surface.
pub const STAT_KINDS: &[&str] = &[
    "merged-pull-request-count",
    "closed-pull-request-count",
    "open-pull-request-count",
    "open-issue-count",
    "closed-issue-count",
    "repository-count",
];

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub did: String,
    pub description: String,
    pub location: Option<String>,
    pub include_bluesky: bool,
    pub created: String,
}

#[derive(Debug, Clone)]
pub struct ProfileDetail {
    pub profile: Profile,
    pub links: Vec<String>,
    pub stats: Vec<String>,
    pub pins: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub did: String,
    pub description: String,
    pub location: Option<String>,
    pub include_bluesky: bool,
    pub links: Vec<String>,
    pub stats: Vec<String>,
    pub pins: Vec<String>,
}

impl Db {
    /// Upsert a profile and replace its children in one transaction.
    /// Pins that point at repos this appview has not indexed are dropped.
    pub async fn put_profile(&self, new: NewProfile) -> Result<()> {
        if new.links.len() > MAX_LINKS {
            return Err(DbError::Validation(format!(
                "at most {MAX_LINKS} profile links"
            )));
        }
        if new.stats.len() > MAX_STATS {
            return Err(DbError::Validation(format!(
                "at most {MAX_STATS} profile stats"
            )));
        }
        if new.pins.len() > MAX_PINS {
            return Err(DbError::Validation(format!(
                "at most {MAX_PINS} pinned repos"
            )));
        }
        for stat in &new.stats {
            if !STAT_KINDS.contains(&stat.as_str()) {
                return Err(DbError::Validation(format!("unknown stat kind {stat}")));
            }
        }

        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            insert into profiles (did, description, location, include_bluesky)
            values (?, ?, ?, ?)
            on conflict(did) do update set
                description = excluded.description,
                location = excluded.location,
                include_bluesky = excluded.include_bluesky
            "#,
        )
        .bind(&new.did)
        .bind(&new.description)
        .bind(&new.location)
        .bind(new.include_bluesky)
        .execute(&mut *tx)
        .await?;

        for table in ["profile_links", "profile_stats", "profile_pins"] {
            let sql = format!("delete from {table} where did = ?");
            sqlx::query(&sql).bind(&new.did).execute(&mut *tx).await?;
        }
        for (position, url) in new.links.iter().enumerate() {
            sqlx::query("insert into profile_links (did, url, position) values (?, ?, ?)")
                .bind(&new.did)
                .bind(url)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }
        for (position, kind) in new.stats.iter().enumerate() {
            sqlx::query("insert into profile_stats (did, kind, position) values (?, ?, ?)")
                .bind(&new.did)
                .bind(kind)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }
        let mut position = 0i64;
        for at_uri in &new.pins {
            let known: Option<(i64,)> = sqlx::query_as("select 1 from repos where at_uri = ?")
                .bind(at_uri)
                .fetch_optional(&mut *tx)
                .await?;
            if known.is_none() {
                continue;
            }
            sqlx::query("insert into profile_pins (did, at_uri, position) values (?, ?, ?)")
                .bind(&new.did)
                .bind(at_uri)
                .bind(position)
                .execute(&mut *tx)
                .await?;
            position += 1;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_profile(&self, did: &str) -> Result<Option<ProfileDetail>> {
        let profile = sqlx::query_as::<_, Profile>("select * from profiles where did = ?")
            .bind(did)
            .fetch_optional(self.pool())
            .await?;
        let Some(profile) = profile else {
            return Ok(None);
        };

        let links: Vec<(String,)> =
            sqlx::query_as("select url from profile_links where did = ? order by position")
                .bind(did)
                .fetch_all(self.pool())
                .await?;
        let stats: Vec<(String,)> =
            sqlx::query_as("select kind from profile_stats where did = ? order by position")
                .bind(did)
                .fetch_all(self.pool())
                .await?;
        let pins: Vec<(String,)> =
            sqlx::query_as("select at_uri from profile_pins where did = ? order by position")
                .bind(did)
                .fetch_all(self.pool())
                .await?;

        Ok(Some(ProfileDetail {
            profile,
            links: links.into_iter().map(|(u,)| u).collect(),
            stats: stats.into_iter().map(|(k,)| k).collect(),
            pins: pins.into_iter().map(|(p,)| p).collect(),
        }))
    }

    pub async fn list_profiles(&self, filters: &[Filter], page: Option<Page>) -> Result<Vec<Profile>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!("select * from profiles{where_sql} order by created desc");
        if let Some(page) = page {
            sql.push_str(&format!(" limit {} offset {}", page.limit, page.offset));
        }
        let mut query = sqlx::query_as::<_, Profile>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }
}
