//! Release artifacts. The tag is a raw 20-byte object id; `(repo, tag,
//! name)` names an artifact uniquely within a release.

use sqlx::FromRow;

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Artifact {
    pub id: i64,
    pub did: String,
    pub rkey: String,
    pub repo_at: String,
    pub tag: Vec<u8>,
    pub blob_cid: String,
    pub name: String,
    pub size: i64,
    pub mimetype: String,
    pub created: String,
}

#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub did: String,
    pub rkey: String,
    pub repo_at: String,
    pub tag: Vec<u8>,
    pub blob_cid: String,
    pub name: String,
    pub size: i64,
    pub mimetype: String,
    pub created: Option<String>,
}

impl Db {
    pub async fn put_artifact(&self, new: NewArtifact) -> Result<Artifact> {
        if new.tag.len() != 20 {
            return Err(DbError::Validation(format!(
                "artifact tag must be 20 bytes, got {}",
                new.tag.len()
            )));
        }
        let created = new.created.unwrap_or_else(plait_common::now_rfc3339);
        let artifact = sqlx::query_as::<_, Artifact>(
            r#"
            insert into artifacts (did, rkey, repo_at, tag, blob_cid, name, size, mimetype, created)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?)
            on conflict(did, rkey) do update set
                blob_cid = excluded.blob_cid,
                name = excluded.name,
                size = excluded.size,
                mimetype = excluded.mimetype
            returning *
            "#,
        )
        .bind(&new.did)
        .bind(&new.rkey)
        .bind(&new.repo_at)
        .bind(&new.tag)
        .bind(&new.blob_cid)
        .bind(&new.name)
        .bind(new.size)
        .bind(&new.mimetype)
        .bind(&created)
        .fetch_one(self.pool())
        .await?;
        Ok(artifact)
    }

    pub async fn delete_artifact(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from artifacts where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_artifacts(&self, filters: &[Filter]) -> Result<Vec<Artifact>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select * from artifacts{where_sql} order by created desc");
        let mut query = sqlx::query_as::<_, Artifact>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }
}
