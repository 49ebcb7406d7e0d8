//! Record validation: bounds, enumerations, and existence checks that run
//! before anything touches the store.

use plait_common::AppError;
use plait_db::Db;

use crate::records::{IssueCommentRecord, IssueRecord, LabelDefinitionRecord, StringContentRecord};

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_BODY_LEN: usize = 64 * 1024;
pub const MAX_STRING_LEN: usize = 100 * 1024;
pub const MAX_FILENAME_LEN: usize = 255;

const VALUE_TYPES: &[&str] = &["null", "string", "integer", "boolean"];
const VALUE_FORMATS: &[&str] = &["any", "did"];

pub struct Validator {
    db: Db,
}

impl Validator {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Title/body bounds plus the target repo must be indexed. Returns the
    /// repo row.
    pub async fn validate_issue(
        &self,
        record: &IssueRecord,
    ) -> Result<plait_db::repos::Repo, AppError> {
        let title = record.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("issue title is empty".into()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "issue title exceeds {MAX_TITLE_LEN} bytes"
            )));
        }
        if record.body.len() > MAX_BODY_LEN {
            return Err(AppError::Validation(format!(
                "issue body exceeds {MAX_BODY_LEN} bytes"
            )));
        }
        let repo = self
            .db
            .get_repo_by_at_uri(&record.repo)
            .await
            .map_err(AppError::from)?;
        repo.ok_or_else(|| {
            AppError::NotFound(format!("issue targets unknown repo {}", record.repo))
        })
    }

    /// Comment body bounds plus the parent issue must be indexed. Returns
    /// the issue row.
    pub async fn validate_issue_comment(
        &self,
        record: &IssueCommentRecord,
    ) -> Result<plait_db::issues::Issue, AppError> {
        if record.body.trim().is_empty() {
            return Err(AppError::Validation("comment body is empty".into()));
        }
        if record.body.len() > MAX_BODY_LEN {
            return Err(AppError::Validation(format!(
                "comment body exceeds {MAX_BODY_LEN} bytes"
            )));
        }
        let issue = self
            .db
            .get_issue_by_at_uri(&record.issue)
            .await
            .map_err(AppError::from)?;
        issue.ok_or_else(|| {
            AppError::NotFound(format!("comment targets unknown issue {}", record.issue))
        })
    }

    pub fn validate_string(&self, record: &StringContentRecord) -> Result<(), AppError> {
        if record.filename.trim().is_empty() {
            return Err(AppError::Validation("filename is empty".into()));
        }
        if record.filename.len() > MAX_FILENAME_LEN {
            return Err(AppError::Validation(format!(
                "filename exceeds {MAX_FILENAME_LEN} bytes"
            )));
        }
        if record.contents.is_empty() {
            return Err(AppError::Validation("contents are empty".into()));
        }
        if record.contents.len() > MAX_STRING_LEN {
            return Err(AppError::Validation(format!(
                "contents exceed {MAX_STRING_LEN} bytes"
            )));
        }
        Ok(())
    }

    pub fn validate_label_definition(
        &self,
        record: &LabelDefinitionRecord,
    ) -> Result<(), AppError> {
        if record.name.trim().is_empty() {
            return Err(AppError::Validation("label name is empty".into()));
        }
        if !VALUE_TYPES.contains(&record.value_type.as_str()) {
            return Err(AppError::Validation(format!(
                "unknown label value type {}",
                record.value_type
            )));
        }
        if !VALUE_FORMATS.contains(&record.value_format.as_str()) {
            return Err(AppError::Validation(format!(
                "unknown label value format {}",
                record.value_format
            )));
        }
        if record.value_type == "null" && !record.value_enum.is_empty() {
            return Err(AppError::Validation(
                "null-typed label cannot carry an enum".into(),
            ));
        }
        if record.value_enum.iter().any(|v| v.trim().is_empty()) {
            return Err(AppError::Validation("empty label enum value".into()));
        }
        Ok(())
    }
}
