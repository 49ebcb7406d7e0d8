//! Wire shapes of the record collections the appview indexes. Decoded
//! from the raw record bytes carried by the log.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRecord {
    pub name: String,
    pub knot: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub spindle: Option<String>,
    /// Source repo at-uri; present on forks.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRecord {
    /// Subject DID.
    pub subject: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarRecord {
    /// Starred repo's record URI.
    pub subject: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Owning repo's record URI.
    pub repo: String,
    /// Hex-encoded 20-byte object id of the release tag.
    pub tag: String,
    pub blob_cid: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_mimetype() -> String {
    "*/*".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub include_bluesky: bool,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub stats: Vec<String>,
    #[serde(default)]
    pub pinned_repos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpindleRecord {
    pub instance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpindleMemberRecord {
    pub instance: String,
    /// Invited DID.
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnotRecord {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnotMemberRecord {
    pub domain: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringContentRecord {
    pub filename: String,
    #[serde(default)]
    pub description: String,
    pub contents: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Target repo's record URI.
    pub repo: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommentRecord {
    /// The issue's record URI.
    pub issue: String,
    pub body: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDefinitionRecord {
    pub name: String,
    pub value_type: String,
    #[serde(default = "default_value_format")]
    pub value_format: String,
    #[serde(default)]
    pub value_enum: Vec<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_value_format() -> String {
    "any".to_string()
}
