//! Knot registrations. A row starts `Pending` and becomes `Registered`
//! only after owner verification succeeds against the knot itself.

use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Registration {
    pub id: i64,
    pub domain: String,
    pub did: String,
    pub secret: String,
    pub created: String,
    pub registered: Option<String>,
}

impl Registration {
    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }
}

impl Db {
    /// Register a knot domain for `did`, generating its shared secret.
    /// Re-registration by the same DID returns the existing row (and
    /// secret); a different claimant is a conflict.
    pub async fn register_knot(&self, domain: &str, did: &str) -> Result<Registration> {
        if let Some(existing) = self.get_registration(domain).await? {
            if existing.did == did {
                return Ok(existing);
            }
            return Err(DbError::Conflict(format!(
                "domain {domain} already claimed"
            )));
        }
        let secret = Uuid::new_v4().simple().to_string();
        let row = sqlx::query_as::<_, Registration>(
            "insert into registrations (domain, did, secret) values (?, ?, ?) returning *",
        )
        .bind(domain)
        .bind(did)
        .bind(&secret)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_registration(&self, domain: &str) -> Result<Option<Registration>> {
        let row = sqlx::query_as::<_, Registration>(
            "select * from registrations where domain = ?",
        )
        .bind(domain)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn mark_registered(&self, domain: &str) -> Result<()> {
        let res = sqlx::query(
            "update registrations set registered = ? where domain = ? and registered is null",
        )
        .bind(plait_common::now_rfc3339())
        .bind(domain)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 && self.get_registration(domain).await?.is_none() {
            return Err(DbError::NotFound(format!("registration {domain}")));
        }
        Ok(())
    }

    pub async fn list_registrations(&self, filters: &[Filter]) -> Result<Vec<Registration>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!("select * from registrations{where_sql} order by created desc");
        let mut query = sqlx::query_as::<_, Registration>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    pub async fn delete_registration(&self, domain: &str, did: &str) -> Result<()> {
        sqlx::query("delete from registrations where domain = ? and did = ?")
            .bind(domain)
            .bind(did)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
