//! Owner verification for knots and spindles.
//!
//! A server proves it acts for a DID by serving that DID on its `/owner`
//! endpoint. The fetch is tightly bounded: one second, one kibibyte.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

const OWNER_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_BODY: usize = 1024;

#[derive(Error, Debug)]
pub enum VerifyError {
    /// Unreachable instance, non-200 response, or an empty body.
    #[error("owner fetch failed for {instance}: {reason}")]
    Fetch { instance: String, reason: String },

    #[error("owner mismatch: expected {expected}, observed {observed}")]
    OwnerMismatch { expected: String, observed: String },
}

impl From<VerifyError> for plait_common::AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Fetch { .. } => plait_common::AppError::Dependency(err.to_string()),
            VerifyError::OwnerMismatch { .. } => {
                plait_common::AppError::PermissionDenied(err.to_string())
            }
        }
    }
}

#[derive(Clone)]
pub struct Verifier {
    client: reqwest::Client,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(OWNER_TIMEOUT)
            .build()
            .expect("static client configuration");
        Self { client }
    }

    /// GET `<scheme>://<instance>/owner` and compare the trimmed body to
    /// `expected_owner`.
    pub async fn run_verification(
        &self,
        instance: &str,
        expected_owner: &str,
    ) -> Result<(), VerifyError> {
        let url = format!("{}://{instance}/owner", scheme_for(instance));
        debug!(%url, "verifying server owner");

        let fetch_err = |reason: String| VerifyError::Fetch {
            instance: instance.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("status {}", response.status())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let capped = &body[..body.len().min(MAX_BODY)];
        let observed = String::from_utf8_lossy(capped).trim().to_string();
        if observed.is_empty() {
            return Err(fetch_err("empty body".into()));
        }

        if observed == expected_owner {
            Ok(())
        } else {
            Err(VerifyError::OwnerMismatch {
                expected: expected_owner.to_string(),
                observed,
            })
        }
    }
}

/// Local instances are reached over plain http; everything else is https.
fn scheme_for(instance: &str) -> &'static str {
    let host = instance.split(':').next().unwrap_or(instance);
    if host == "localhost" || host == "[::1]" || host.starts_with("127.") {
        "http"
    } else {
        "https"
    }
}
