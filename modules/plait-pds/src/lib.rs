//! External collaborator surfaces.
//!
//! The appview core never talks to a PDS, the PLC directory, DNS, SMTP or
//! the RBAC policy store directly; it consumes these capability traits.
//! Concrete transports live outside the core and are injected at wiring
//! time, which also makes every consumer testable with an in-memory stub.

use async_trait::async_trait;
use plait_common::AppError;
use serde::{Deserialize, Serialize};

/// One entry of a batched repo write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RecordWrite {
    Put {
        collection: String,
        rkey: String,
        record: serde_json::Value,
    },
    Delete {
        collection: String,
        rkey: String,
    },
}

/// Write surface of the user's PDS. Every write names an explicit rkey so
/// the caller, not the PDS, owns record identity.
#[async_trait]
pub trait RecordClient: Send + Sync {
    /// Create or replace a record; `swap_cid` makes the replace
    /// conditional on the current version.
    async fn put_record(
        &self,
        collection: &str,
        repo: &str,
        rkey: &str,
        record: serde_json::Value,
        swap_cid: Option<&str>,
    ) -> Result<(), AppError>;

    async fn delete_record(&self, collection: &str, repo: &str, rkey: &str)
        -> Result<(), AppError>;

    async fn get_record(
        &self,
        cid: Option<&str>,
        collection: &str,
        repo: &str,
        rkey: &str,
    ) -> Result<Option<serde_json::Value>, AppError>;

    /// Returns the blob's CID.
    async fn upload_blob(&self, bytes: Vec<u8>, mimetype: &str) -> Result<String, AppError>;

    async fn apply_writes(&self, repo: &str, writes: Vec<RecordWrite>) -> Result<(), AppError>;
}

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub did: String,
    pub handle: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, did_or_handle: &str) -> Result<Identity, AppError>;

    async fn resolve_many(&self, ids: &[String]) -> Result<Vec<Identity>, AppError>;
}

/// Permission checks and grants keyed `(subject, domain, resource,
/// action)`. The appview never mutates indexed state on behalf of a user
/// without going through this.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn enforce(
        &self,
        subject: &str,
        domain: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, AppError>;

    async fn add_role(&self, subject: &str, domain: &str, role: &str) -> Result<(), AppError>;

    async fn remove_role(&self, subject: &str, domain: &str, role: &str) -> Result<(), AppError>;
}

/// DNS provisioning, used by the signup flow only.
#[async_trait]
pub trait DnsProvisioner: Send + Sync {
    async fn create_record(
        &self,
        record_type: &str,
        name: &str,
        content: &str,
        ttl: u32,
        proxied: bool,
    ) -> Result<(), AppError>;

    async fn delete_record(&self, record_type: &str, name: &str) -> Result<(), AppError>;
}

/// Outbound mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<(), AppError>;
}

/// Allow-everything authorizer for tests and single-tenant setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn enforce(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn add_role(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn remove_role(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Ok(())
    }
}
