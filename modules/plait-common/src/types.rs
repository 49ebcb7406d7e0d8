use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Collection NSIDs ---

/// Record collections indexed by the appview. Anything else on the wire is
/// ignored by the dispatcher.
pub mod nsid {
    pub const REPO: &str = "app.plait.repo";
    pub const ISSUE: &str = "app.plait.repo.issue";
    pub const ISSUE_COMMENT: &str = "app.plait.repo.issue.comment";
    pub const PULL: &str = "app.plait.repo.pull";
    pub const PULL_COMMENT: &str = "app.plait.repo.pull.comment";
    pub const ARTIFACT: &str = "app.plait.repo.artifact";
    pub const STAR: &str = "app.plait.feed.star";
    pub const FOLLOW: &str = "app.plait.graph.follow";
    pub const PROFILE: &str = "app.plait.actor.profile";
    pub const PUBLIC_KEY: &str = "app.plait.publicKey";
    pub const KNOT: &str = "app.plait.knot";
    pub const KNOT_MEMBER: &str = "app.plait.knot.member";
    pub const SPINDLE: &str = "app.plait.spindle";
    pub const SPINDLE_MEMBER: &str = "app.plait.spindle.member";
    pub const STRING: &str = "app.plait.string";
    pub const LABEL_DEFINITION: &str = "app.plait.label.definition";
    pub const LABEL_OP: &str = "app.plait.label.op";
    pub const PIPELINE: &str = "app.plait.pipeline";
    pub const PIPELINE_STATUS: &str = "app.plait.pipeline.status";
}

// --- AT URIs ---

/// A parsed `at://<did>/<collection>/<rkey>` record URI.
///
/// The appview treats DIDs and rkeys as opaque strings; the URI is the
/// canonical identity of every indexed record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtUri {
    pub did: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    pub fn new(
        did: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }
}

impl std::fmt::Display for AtUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

impl std::str::FromStr for AtUri {
    type Err = crate::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("at://")
            .ok_or_else(|| crate::AppError::Validation(format!("not an at-uri: {s}")))?;
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(did), Some(collection), Some(rkey))
                if !did.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self::new(did, collection, rkey))
            }
            _ => Err(crate::AppError::Validation(format!("malformed at-uri: {s}"))),
        }
    }
}

/// Shorthand for building a record URI string without going through [`AtUri`].
pub fn at_uri(did: &str, collection: &str, rkey: &str) -> String {
    format!("at://{did}/{collection}/{rkey}")
}

// --- Pagination ---

/// Offset/limit window for list queries. Queries without a page return the
/// full (still `created desc` ordered) result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn first(limit: i64) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

// --- Time ---

/// RFC-3339 `now`, the wire form of every timestamp the appview writes.
/// Z-suffixed so stored timestamps order lexicographically.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a wire timestamp, tolerating a trailing `Z` or offset form.
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
