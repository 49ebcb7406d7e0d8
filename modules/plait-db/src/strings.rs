//! Code snippets ("strings"), keyed `(did, rkey)`.

use sqlx::FromRow;

use crate::error::Result;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct StringRecord {
    pub did: String,
    pub rkey: String,
    pub filename: String,
    pub description: String,
    pub content: String,
    pub created: String,
    pub edited: Option<String>,
}

impl Db {
    /// Upsert; replacing an existing snippet stamps `edited`.
    pub async fn put_string(
        &self,
        did: &str,
        rkey: &str,
        filename: &str,
        description: &str,
        content: &str,
        created: Option<String>,
    ) -> Result<StringRecord> {
        let created = created.unwrap_or_else(plait_common::now_rfc3339);
        let row = sqlx::query_as::<_, StringRecord>(
            r#"
            insert into strings (did, rkey, filename, description, content, created)
            values (?, ?, ?, ?, ?, ?)
            on conflict(did, rkey) do update set
                filename = excluded.filename,
                description = excluded.description,
                content = excluded.content,
                edited = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
            returning *
            "#,
        )
        .bind(did)
        .bind(rkey)
        .bind(filename)
        .bind(description)
        .bind(content)
        .bind(&created)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_string(&self, did: &str, rkey: &str) -> Result<Option<StringRecord>> {
        let row = sqlx::query_as::<_, StringRecord>(
            "select * from strings where did = ? and rkey = ?",
        )
        .bind(did)
        .bind(rkey)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn delete_string(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from strings where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_strings(&self, did: &str) -> Result<Vec<StringRecord>> {
        let rows = sqlx::query_as::<_, StringRecord>(
            "select * from strings where did = ? order by created desc",
        )
        .bind(did)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
