//! Repo collaborators. Rows cascade away with their repo.

use sqlx::FromRow;

use crate::error::Result;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Collaborator {
    pub id: i64,
    pub did: String,
    pub rkey: Option<String>,
    pub subject_did: String,
    pub repo_at: String,
    pub created: String,
}

impl Db {
    pub async fn add_collaborator(
        &self,
        did: &str,
        rkey: Option<&str>,
        subject_did: &str,
        repo_at: &str,
    ) -> Result<()> {
        sqlx::query(
            "insert into collaborators (did, rkey, subject_did, repo_at) values (?, ?, ?, ?)",
        )
        .bind(did)
        .bind(rkey)
        .bind(subject_did)
        .bind(repo_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn remove_collaborator(&self, subject_did: &str, repo_at: &str) -> Result<()> {
        sqlx::query("delete from collaborators where subject_did = ? and repo_at = ?")
            .bind(subject_did)
            .bind(repo_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_collaborators(&self, repo_at: &str) -> Result<Vec<Collaborator>> {
        let rows = sqlx::query_as::<_, Collaborator>(
            "select * from collaborators where repo_at = ? order by created desc",
        )
        .bind(repo_at)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn is_collaborator(&self, subject_did: &str, repo_at: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "select 1 from collaborators where subject_did = ? and repo_at = ? limit 1",
        )
        .bind(subject_did)
        .bind(repo_at)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.is_some())
    }
}
