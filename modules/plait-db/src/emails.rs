//! Email bookkeeping for signup and notification delivery. Transport is a
//! collaborator; only addresses, verification codes and flags live here.

use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Email {
    pub id: i64,
    pub did: String,
    pub email: String,
    pub verified: bool,
    pub verification_code: String,
    pub last_sent: Option<String>,
    pub is_primary: bool,
    pub created: String,
}

impl Db {
    /// Add an address and mint its verification code.
    pub async fn add_email(&self, did: &str, email: &str) -> Result<Email> {
        let code = Uuid::new_v4().simple().to_string();
        let row = sqlx::query_as::<_, Email>(
            r#"
            insert into emails (did, email, verification_code, last_sent)
            values (?, ?, ?, ?)
            returning *
            "#,
        )
        .bind(did)
        .bind(email)
        .bind(&code)
        .bind(plait_common::now_rfc3339())
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    /// Resend semantics: overwrite the stored code and refresh
    /// `last_sent`.
    pub async fn rotate_verification_code(&self, did: &str, email: &str) -> Result<Email> {
        let code = Uuid::new_v4().simple().to_string();
        let row = sqlx::query_as::<_, Email>(
            r#"
            update emails set verification_code = ?, last_sent = ?
            where did = ? and email = ? and verified = 0
            returning *
            "#,
        )
        .bind(&code)
        .bind(plait_common::now_rfc3339())
        .bind(did)
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(|| DbError::NotFound(format!("unverified email for {did}")))
    }

    pub async fn verify_email(&self, did: &str, email: &str, code: &str) -> Result<()> {
        let res = sqlx::query(
            "update emails set verified = 1 where did = ? and email = ? and verification_code = ?",
        )
        .bind(did)
        .bind(email)
        .bind(code)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::Validation("bad verification code".into()));
        }
        Ok(())
    }

    /// Promote one verified address to primary, demoting the rest.
    pub async fn set_primary_email(&self, did: &str, email: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        sqlx::query("update emails set is_primary = 0 where did = ?")
            .bind(did)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query(
            "update emails set is_primary = 1 where did = ? and email = ? and verified = 1",
        )
        .bind(did)
        .bind(email)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("verified email for {did}")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_emails(&self, did: &str) -> Result<Vec<Email>> {
        let rows =
            sqlx::query_as::<_, Email>("select * from emails where did = ? order by created asc")
                .bind(did)
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    pub async fn delete_email(&self, did: &str, email: &str) -> Result<()> {
        sqlx::query("delete from emails where did = ? and email = ?")
            .bind(did)
            .bind(email)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
