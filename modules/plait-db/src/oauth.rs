//! OAuth rows. Requests are transient (consumed on callback); sessions
//! are long-lived, one per DID. Token exchange itself happens outside the
//! core.

use sqlx::FromRow;

use crate::error::{DbError, Result};
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct OAuthRequest {
    pub id: i64,
    pub did: String,
    pub state: String,
    pub auth_server_iss: String,
    pub pds_url: String,
    pub pkce_verifier: String,
    pub dpop_private_jwk: String,
    pub created: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthSession {
    pub id: i64,
    pub did: String,
    pub pds_url: String,
    pub auth_server_iss: String,
    pub access_token: String,
    pub refresh_token: String,
    pub dpop_private_jwk: String,
    pub expiry: String,
    pub created: String,
}

impl Db {
    pub async fn save_oauth_request(
        &self,
        did: &str,
        state: &str,
        auth_server_iss: &str,
        pds_url: &str,
        pkce_verifier: &str,
        dpop_private_jwk: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert into oauth_requests (did, state, auth_server_iss, pds_url, pkce_verifier, dpop_private_jwk)
            values (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(did)
        .bind(state)
        .bind(auth_server_iss)
        .bind(pds_url)
        .bind(pkce_verifier)
        .bind(dpop_private_jwk)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Consume a request by `state`: returned exactly once, then gone.
    pub async fn take_oauth_request(&self, state: &str) -> Result<OAuthRequest> {
        let mut tx = self.begin().await?;
        let row = sqlx::query_as::<_, OAuthRequest>(
            "select * from oauth_requests where state = ?",
        )
        .bind(state)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("oauth request {state}")))?;
        sqlx::query("delete from oauth_requests where state = ?")
            .bind(state)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn save_oauth_session(
        &self,
        did: &str,
        pds_url: &str,
        auth_server_iss: &str,
        access_token: &str,
        refresh_token: &str,
        dpop_private_jwk: &str,
        expiry: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert into oauth_sessions
                (did, pds_url, auth_server_iss, access_token, refresh_token, dpop_private_jwk, expiry)
            values (?, ?, ?, ?, ?, ?, ?)
            on conflict(did) do update set
                pds_url = excluded.pds_url,
                auth_server_iss = excluded.auth_server_iss,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                dpop_private_jwk = excluded.dpop_private_jwk,
                expiry = excluded.expiry
            "#,
        )
        .bind(did)
        .bind(pds_url)
        .bind(auth_server_iss)
        .bind(access_token)
        .bind(refresh_token)
        .bind(dpop_private_jwk)
        .bind(expiry)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_oauth_session(&self, did: &str) -> Result<Option<OAuthSession>> {
        let row = sqlx::query_as::<_, OAuthSession>(
            "select * from oauth_sessions where did = ?",
        )
        .bind(did)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn delete_oauth_session(&self, did: &str) -> Result<()> {
        sqlx::query("delete from oauth_sessions where did = ?")
            .bind(did)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
