//! Spindles (CI coordinators) and their members. Verification follows the
//! same owner-endpoint protocol as knot registration.

use sqlx::FromRow;

use crate::error::Result;
use crate::filter::{self, Filter};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Spindle {
    pub id: i64,
    pub owner: String,
    pub instance: String,
    pub verified: Option<String>,
    pub created: String,
}

impl Spindle {
    pub fn is_verified(&self) -> bool {
        self.verified.is_some()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SpindleMember {
    pub id: i64,
    pub did: String,
    pub rkey: String,
    pub instance: String,
    pub subject: String,
    pub created: String,
}

impl Db {
    pub async fn add_spindle(&self, owner: &str, instance: &str) -> Result<()> {
        sqlx::query("insert or ignore into spindles (owner, instance) values (?, ?)")
            .bind(owner)
            .bind(instance)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_spindle_verified(&self, owner: &str, instance: &str) -> Result<()> {
        sqlx::query(
            "update spindles set verified = ? where owner = ? and instance = ? and verified is null",
        )
        .bind(plait_common::now_rfc3339())
        .bind(owner)
        .bind(instance)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_spindle(&self, owner: &str, instance: &str) -> Result<Option<Spindle>> {
        let row = sqlx::query_as::<_, Spindle>(
            "select * from spindles where owner = ? and instance = ?",
        )
        .bind(owner)
        .bind(instance)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn list_spindles(&self, filters: &[Filter]) -> Result<Vec<Spindle>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select * from spindles{where_sql} order by created desc");
        let mut query = sqlx::query_as::<_, Spindle>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    pub async fn delete_spindle(&self, owner: &str, instance: &str) -> Result<()> {
        sqlx::query("delete from spindles where owner = ? and instance = ?")
            .bind(owner)
            .bind(instance)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // --- Members ---

    pub async fn put_spindle_member(
        &self,
        did: &str,
        rkey: &str,
        instance: &str,
        subject: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert into spindle_members (did, rkey, instance, subject)
            values (?, ?, ?, ?)
            on conflict(did, instance, subject) do update set rkey = excluded.rkey
            "#,
        )
        .bind(did)
        .bind(rkey)
        .bind(instance)
        .bind(subject)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_spindle_member(&self, did: &str, rkey: &str) -> Result<()> {
        sqlx::query("delete from spindle_members where did = ? and rkey = ?")
            .bind(did)
            .bind(rkey)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_spindle_members(&self, instance: &str) -> Result<Vec<SpindleMember>> {
        let rows = sqlx::query_as::<_, SpindleMember>(
            "select * from spindle_members where instance = ? order by created desc",
        )
        .bind(instance)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
