//! SSH public keys announced by users.

use sqlx::FromRow;

use crate::error::Result;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct PublicKey {
    pub id: i64,
    pub did: String,
    pub name: String,
    pub key: String,
    pub rkey: String,
    pub created: String,
}

impl Db {
    /// Idempotent on `(did, name, key)`: re-delivery inserts nothing.
    pub async fn put_public_key(
        &self,
        did: &str,
        name: &str,
        key: &str,
        rkey: &str,
    ) -> Result<()> {
        sqlx::query(
            "insert or ignore into public_keys (did, name, key, rkey) values (?, ?, ?, ?)",
        )
        .bind(did)
        .bind(name)
        .bind(key)
        .bind(rkey)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_public_key(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from public_keys where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_public_keys(&self, did: &str) -> Result<Vec<PublicKey>> {
        let rows = sqlx::query_as::<_, PublicKey>(
            "select * from public_keys where did = ? order by created desc",
        )
        .bind(did)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
