//! Repository records, their languages, and the repo-card aggregation.

use plait_common::{at_uri, nsid, Page};
use sqlx::FromRow;

use crate::error::Result;
use crate::filter::{self, Filter};
use crate::labels::LabelState;
use crate::{Db, FilterValue};

#[derive(Debug, Clone, FromRow)]
pub struct Repo {
    pub id: i64,
    pub did: String,
    pub name: String,
    pub knot: String,
    pub rkey: String,
    pub at_uri: String,
    pub description: Option<String>,
    pub spindle: Option<String>,
    /// Non-empty when this repo is a fork; holds the source repo's at-uri.
    pub source: Option<String>,
    pub created: String,
}

impl Repo {
    pub fn is_fork(&self) -> bool {
        self.source.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewRepo {
    pub did: String,
    pub name: String,
    pub knot: String,
    pub rkey: String,
    pub description: Option<String>,
    pub spindle: Option<String>,
    pub source: Option<String>,
    /// Wire timestamp; the store default is used when absent.
    pub created: Option<String>,
}

/// A repo plus the read-side aggregates every listing surfaces.
#[derive(Debug, Clone)]
pub struct RepoCard {
    pub repo: Repo,
    pub star_count: i64,
    pub open_issues: i64,
    pub closed_issues: i64,
    pub open_pulls: i64,
    pub merged_pulls: i64,
    pub closed_pulls: i64,
    /// Dominant language: largest byte count on the default ref.
    pub language: Option<String>,
    pub labels: LabelState,
}

#[derive(Debug, Clone, FromRow)]
struct RepoCardRow {
    id: i64,
    did: String,
    name: String,
    knot: String,
    rkey: String,
    at_uri: String,
    description: Option<String>,
    spindle: Option<String>,
    source: Option<String>,
    created: String,
    star_count: i64,
    open_issues: i64,
    closed_issues: i64,
    open_pulls: i64,
    merged_pulls: i64,
    closed_pulls: i64,
    language: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RepoLanguage {
    pub id: i64,
    pub repo_at: String,
    pub r#ref: String,
    pub is_default_ref: bool,
    pub language: String,
    pub bytes: i64,
}

impl Db {
    /// Upsert a repo on its record URI. Last writer wins: the record is
    /// authoritatively owned by its authoring identity.
    pub async fn put_repo(&self, new: NewRepo) -> Result<Repo> {
        let uri = at_uri(&new.did, nsid::REPO, &new.rkey);
        let created = new.created.unwrap_or_else(plait_common::now_rfc3339);
        let repo = sqlx::query_as::<_, Repo>(
            r#"
            insert into repos (did, name, knot, rkey, at_uri, description, spindle, source, created)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?)
            on conflict(at_uri) do update set
                name = excluded.name,
                knot = excluded.knot,
                description = excluded.description,
                spindle = excluded.spindle,
                source = excluded.source
            returning *
            "#,
        )
        .bind(&new.did)
        .bind(&new.name)
        .bind(&new.knot)
        .bind(&new.rkey)
        .bind(&uri)
        .bind(&new.description)
        .bind(&new.spindle)
        .bind(&new.source)
        .bind(&created)
        .fetch_one(self.pool())
        .await?;
        Ok(repo)
    }

    pub async fn get_repo(&self, did: &str, name: &str) -> Result<Option<Repo>> {
        let repo = sqlx::query_as::<_, Repo>("select * from repos where did = ? and name = ?")
            .bind(did)
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        Ok(repo)
    }

    pub async fn get_repo_by_at_uri(&self, uri: &str) -> Result<Option<Repo>> {
        let repo = sqlx::query_as::<_, Repo>("select * from repos where at_uri = ?")
            .bind(uri)
            .fetch_optional(self.pool())
            .await?;
        Ok(repo)
    }

    /// Delete a repo and, through the foreign-key graph, its issues, pulls,
    /// submissions, comments, stars, collaborators, artifacts and pins.
    pub async fn delete_repo(&self, did: &str, rkey: &str) -> Result<()> {
        let uri = at_uri(did, nsid::REPO, rkey);
        sqlx::query("delete from repos where at_uri = ?")
            .bind(&uri)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Plain filtered listing, `created desc`.
    pub async fn list_repos(&self, filters: &[Filter], page: Option<Page>) -> Result<Vec<Repo>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!("select * from repos{where_sql} order by created desc");
        if let Some(page) = page {
            sql.push_str(&format!(" limit {} offset {}", page.limit, page.offset));
        }
        let mut query = sqlx::query_as::<_, Repo>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Repo cards: repos joined with star counts, per-state issue and pull
    /// counts, dominant language and applied labels. `created desc`.
    pub async fn get_repos(&self, filters: &[Filter], page: Option<Page>) -> Result<Vec<RepoCard>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!(
            r#"
            select r.id, r.did, r.name, r.knot, r.rkey, r.at_uri, r.description,
                   r.spindle, r.source, r.created,
                   (select count(*) from stars s where s.repo_at = r.at_uri) as star_count,
                   (select count(*) from issues i where i.repo_at = r.at_uri and i.open = 1) as open_issues,
                   (select count(*) from issues i where i.repo_at = r.at_uri and i.open = 0) as closed_issues,
                   (select count(*) from pulls p where p.repo_at = r.at_uri and p.state = 1) as open_pulls,
                   (select count(*) from pulls p where p.repo_at = r.at_uri and p.state = 2) as merged_pulls,
                   (select count(*) from pulls p where p.repo_at = r.at_uri and p.state = 0) as closed_pulls,
                   (select l.language from repo_languages l
                     where l.repo_at = r.at_uri and l.is_default_ref = 1
                     order by l.bytes desc limit 1) as language
            from repos r{where_sql}
            order by r.created desc
            "#
        );
        if let Some(page) = page {
            sql.push_str(&format!(" limit {} offset {}", page.limit, page.offset));
        }
        let mut query = sqlx::query_as::<_, RepoCardRow>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        let rows = query.fetch_all(self.pool()).await?;

        let subjects: Vec<String> = rows.iter().map(|r| r.at_uri.clone()).collect();
        let mut labels = self
            .get_labels(&[Filter::r#in("subject", FilterValue::TextList(subjects))])
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let labels = labels.remove(&row.at_uri).unwrap_or_default();
                RepoCard {
                    repo: Repo {
                        id: row.id,
                        did: row.did,
                        name: row.name,
                        knot: row.knot,
                        rkey: row.rkey,
                        at_uri: row.at_uri,
                        description: row.description,
                        spindle: row.spindle,
                        source: row.source,
                        created: row.created,
                    },
                    star_count: row.star_count,
                    open_issues: row.open_issues,
                    closed_issues: row.closed_issues,
                    open_pulls: row.open_pulls,
                    merged_pulls: row.merged_pulls,
                    closed_pulls: row.closed_pulls,
                    language: row.language,
                    labels,
                }
            })
            .collect())
    }

    pub async fn set_repo_spindle(&self, repo_at: &str, spindle: Option<&str>) -> Result<()> {
        sqlx::query("update repos set spindle = ? where at_uri = ?")
            .bind(spindle)
            .bind(repo_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // --- Languages ---

    pub async fn put_repo_language(
        &self,
        repo_at: &str,
        r#ref: &str,
        is_default_ref: bool,
        language: &str,
        bytes: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert into repo_languages (repo_at, ref, is_default_ref, language, bytes)
            values (?, ?, ?, ?, ?)
            on conflict(repo_at, ref, language) do update set
                bytes = excluded.bytes,
                is_default_ref = excluded.is_default_ref
            "#,
        )
        .bind(repo_at)
        .bind(r#ref)
        .bind(is_default_ref)
        .bind(language)
        .bind(bytes)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Replace every language row for `(repo_at, ref)` in one transaction.
    pub async fn replace_repo_languages(
        &self,
        repo_at: &str,
        r#ref: &str,
        is_default_ref: bool,
        languages: &[(String, i64)],
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        sqlx::query("delete from repo_languages where repo_at = ? and ref = ?")
            .bind(repo_at)
            .bind(r#ref)
            .execute(&mut *tx)
            .await?;
        for (language, bytes) in languages {
            sqlx::query(
                "insert into repo_languages (repo_at, ref, is_default_ref, language, bytes) values (?, ?, ?, ?, ?)",
            )
            .bind(repo_at)
            .bind(r#ref)
            .bind(is_default_ref)
            .bind(language)
            .bind(bytes)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_repo_languages(&self, repo_at: &str, r#ref: &str) -> Result<Vec<RepoLanguage>> {
        let rows = sqlx::query_as::<_, RepoLanguage>(
            "select * from repo_languages where repo_at = ? and ref = ? order by bytes desc",
        )
        .bind(repo_at)
        .bind(r#ref)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
