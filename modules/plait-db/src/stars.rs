//! Stars. Upserts are keyed on `(starred_by_did, repo_at)` so re-delivery
//! of the same record is a no-op.

use std::collections::HashSet;

use sqlx::FromRow;

use crate::filter::{self, Filter};
use crate::repos::Repo;
use crate::error::Result;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Star {
    pub id: i64,
    pub starred_by_did: String,
    pub repo_at: String,
    pub rkey: String,
    pub created: String,
}

impl Db {
    pub async fn put_star(
        &self,
        starred_by_did: &str,
        repo_at: &str,
        rkey: &str,
        created: Option<String>,
    ) -> Result<()> {
        let created = created.unwrap_or_else(plait_common::now_rfc3339);
        sqlx::query(
            r#"
            insert into stars (starred_by_did, repo_at, rkey, created)
            values (?, ?, ?, ?)
            on conflict(starred_by_did, repo_at) do update set rkey = excluded.rkey
            "#,
        )
        .bind(starred_by_did)
        .bind(repo_at)
        .bind(rkey)
        .bind(&created)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_star(&self, starred_by_did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from stars where starred_by_did = ? and rkey = ?")
            .bind(starred_by_did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_stars(&self, filters: &[Filter], limit: Option<i64>) -> Result<Vec<Star>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!("select * from stars{where_sql} order by created desc");
        if let Some(limit) = limit {
            sql.push_str(&format!(" limit {limit}"));
        }
        let mut query = sqlx::query_as::<_, Star>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Stars joined to their (still existing) repo, newest first.
    pub async fn list_stars_with_repos(
        &self,
        filters: &[Filter],
        limit: i64,
    ) -> Result<Vec<(Star, Repo)>> {
        let stars = self.list_stars(filters, Some(limit)).await?;
        let uris: Vec<String> = stars.iter().map(|s| s.repo_at.clone()).collect();
        let repos = self
            .list_repos(&[Filter::r#in("at_uri", uris)], None)
            .await?;
        let by_uri: std::collections::HashMap<String, Repo> = repos
            .into_iter()
            .map(|r| (r.at_uri.clone(), r))
            .collect();
        Ok(stars
            .into_iter()
            .filter_map(|star| {
                let repo = by_uri.get(&star.repo_at).cloned()?;
                Some((star, repo))
            })
            .collect())
    }

    pub async fn star_count(&self, repo_at: &str) -> Result<i64> {
        let n: (i64,) = sqlx::query_as("select count(*) from stars where repo_at = ?")
            .bind(repo_at)
            .fetch_one(self.pool())
            .await?;
        Ok(n.0)
    }

    /// Which of `repo_uris` the viewer has starred, in one query.
    pub async fn starred_among(
        &self,
        viewer_did: &str,
        repo_uris: &[String],
    ) -> Result<HashSet<String>> {
        let filters = [
            Filter::eq("starred_by_did", viewer_did),
            Filter::r#in("repo_at", repo_uris.to_vec()),
        ];
        let stars = self.list_stars(&filters, None).await?;
        Ok(stars.into_iter().map(|s| s.repo_at).collect())
    }
}
