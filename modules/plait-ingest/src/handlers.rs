//! Per-collection handlers. Each one is idempotent on its record's
//! natural key; the stream may replay any suffix after a crash.

use plait_common::AppError;
use plait_db::artifacts::NewArtifact;
use plait_db::issues::NewIssue;
use plait_db::labels::NewLabelDefinition;
use plait_db::notifications::NewNotification;
use plait_db::profiles::NewProfile;
use plait_db::refs::extract_references;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::event::{IngestEvent, RecordOp};
use crate::records::*;

fn decode<T: serde::de::DeserializeOwned>(event: &IngestEvent) -> Result<T, AppError> {
    let record = event
        .record
        .clone()
        .ok_or_else(|| AppError::Validation("record body missing".into()))?;
    serde_json::from_value(record)
        .map_err(|e| AppError::Validation(format!("malformed {} record: {e}", event.collection)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, AppError> {
    if s.len() % 2 != 0 {
        return Err(AppError::Validation("odd-length hex string".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| AppError::Validation(format!("bad hex byte in {s}")))
        })
        .collect()
}

impl Dispatcher {
    pub(crate) async fn handle_follow(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_follow(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: FollowRecord = decode(event)?;
        self.db
            .put_follow(&event.did, &record.subject, &event.rkey, record.created_at)
            .await?;

        let prefs = self.db.get_notification_preferences(&record.subject).await?;
        if prefs.user_followed && record.subject != event.did {
            self.db
                .create_notification(NewNotification {
                    recipient_did: record.subject.clone(),
                    actor_did: event.did.clone(),
                    r#type: "user_followed".into(),
                    entity_type: "profile".into(),
                    entity_id: record.subject,
                    repo_id: None,
                    issue_id: None,
                    pull_id: None,
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn handle_star(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_star(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: StarRecord = decode(event)?;
        let repo = self
            .db
            .get_repo_by_at_uri(&record.subject)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("star of unknown repo {}", record.subject)))?;
        self.db
            .put_star(&event.did, &repo.at_uri, &event.rkey, record.created_at)
            .await?;

        let prefs = self.db.get_notification_preferences(&repo.did).await?;
        if prefs.repo_starred && repo.did != event.did {
            self.db
                .create_notification(NewNotification {
                    recipient_did: repo.did.clone(),
                    actor_did: event.did.clone(),
                    r#type: "repo_starred".into(),
                    entity_type: "repo".into(),
                    entity_id: repo.at_uri.clone(),
                    repo_id: Some(repo.id),
                    issue_id: None,
                    pull_id: None,
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn handle_public_key(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_public_key(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: PublicKeyRecord = decode(event)?;
        self.db
            .put_public_key(&event.did, &record.name, &record.key, &event.rkey)
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_artifact(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_artifact(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: ArtifactRecord = decode(event)?;
        let repo = self
            .db
            .get_repo_by_at_uri(&record.repo)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("artifact for unknown repo {}", record.repo))
            })?;

        let allowed = self
            .authorizer
            .enforce(&event.did, &repo.knot, &repo.at_uri, "repo:push")
            .await?;
        if !allowed {
            return Err(AppError::PermissionDenied(format!(
                "{} may not push to {}",
                event.did, repo.at_uri
            )));
        }

        self.db
            .put_artifact(NewArtifact {
                did: event.did.clone(),
                rkey: event.rkey.clone(),
                repo_at: repo.at_uri,
                tag: decode_hex(&record.tag)?,
                blob_cid: record.blob_cid,
                name: record.name,
                size: record.size,
                mimetype: record.mimetype,
                created: record.created_at,
            })
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_profile(&self, event: &IngestEvent) -> Result<(), AppError> {
        // Profiles live under the fixed `self` rkey; anything else is noise.
        if event.rkey != "self" {
            return Err(AppError::Validation(format!(
                "profile rkey must be `self`, got {}",
                event.rkey
            )));
        }
        if event.op == RecordOp::Delete {
            return Ok(());
        }
        let record: ProfileRecord = decode(event)?;
        self.db
            .put_profile(NewProfile {
                did: event.did.clone(),
                description: record.description,
                location: record.location,
                include_bluesky: record.include_bluesky,
                links: record.links,
                stats: record.stats,
                pins: record.pinned_repos,
            })
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_spindle(&self, event: &IngestEvent) -> Result<(), AppError> {
        // The rkey is the instance domain.
        let instance = event.rkey.as_str();
        if event.op == RecordOp::Delete {
            self.db.delete_spindle(&event.did, instance).await?;
            return Ok(());
        }
        self.db.add_spindle(&event.did, instance).await?;

        match self.verifier.run_verification(instance, &event.did).await {
            Ok(()) => {
                self.db.mark_spindle_verified(&event.did, instance).await?;
                self.authorizer
                    .add_role(&event.did, instance, "server:owner")
                    .await?;
                info!(instance, owner = %event.did, "spindle verified");
            }
            Err(err) => {
                warn!(instance, %err, "spindle verification failed; left unverified");
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_spindle_member(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_spindle_member(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: SpindleMemberRecord = decode(event)?;
        let allowed = self
            .authorizer
            .enforce(&event.did, &record.instance, &record.instance, "server:invite")
            .await?;
        if !allowed {
            return Err(AppError::PermissionDenied(format!(
                "{} may not invite to {}",
                event.did, record.instance
            )));
        }
        self.db
            .put_spindle_member(&event.did, &event.rkey, &record.instance, &record.subject)
            .await?;
        self.authorizer
            .add_role(&record.subject, &record.instance, "server:member")
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_knot(&self, event: &IngestEvent) -> Result<(), AppError> {
        let domain = event.rkey.as_str();
        if event.op == RecordOp::Delete {
            self.db.delete_registration(domain, &event.did).await?;
            return Ok(());
        }
        self.db.register_knot(domain, &event.did).await?;

        match self.verifier.run_verification(domain, &event.did).await {
            Ok(()) => {
                self.db.mark_registered(domain).await?;
                self.authorizer
                    .add_role(&event.did, domain, "server:owner")
                    .await?;
                info!(domain, owner = %event.did, "knot registered");
            }
            Err(err) => {
                warn!(domain, %err, "knot verification failed; left pending");
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_knot_member(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            // Membership is a pure RBAC grant; the grant removal needs the
            // record body, which deletes don't carry.
            return Ok(());
        }
        let record: KnotMemberRecord = decode(event)?;
        let allowed = self
            .authorizer
            .enforce(&event.did, &record.domain, &record.domain, "server:invite")
            .await?;
        if !allowed {
            return Err(AppError::PermissionDenied(format!(
                "{} may not invite to {}",
                event.did, record.domain
            )));
        }
        self.authorizer
            .add_role(&record.subject, &record.domain, "server:member")
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_string(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_string(&event.did, &event.rkey).await?;
            return Ok(());
        }
        let record: StringContentRecord = decode(event)?;
        self.validator.validate_string(&record)?;
        self.db
            .put_string(
                &event.did,
                &event.rkey,
                &record.filename,
                &record.description,
                &record.contents,
                record.created_at,
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_issue(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db.delete_issue(&event.at_uri()).await?;
            return Ok(());
        }
        let record: IssueRecord = decode(event)?;
        let repo = self.validator.validate_issue(&record).await?;

        let issue = self
            .db
            .put_issue(NewIssue {
                owner_did: event.did.clone(),
                repo_at: repo.at_uri.clone(),
                title: record.title,
                body: record.body.clone(),
                issue_at: Some(event.at_uri()),
                created: record.created_at,
            })
            .await?;

        // Mentions in the body become reference edges from this issue.
        let mentions = extract_references(&repo.did, &repo.name, &record.body);
        let targets = self.db.resolve_references(&mentions).await?;
        self.db.put_references(&event.at_uri(), &targets).await?;

        let prefs = self.db.get_notification_preferences(&repo.did).await?;
        if prefs.issue_created && repo.did != event.did {
            self.db
                .create_notification(NewNotification {
                    recipient_did: repo.did.clone(),
                    actor_did: event.did.clone(),
                    r#type: "issue_created".into(),
                    entity_type: "issue".into(),
                    entity_id: issue.issue_id.to_string(),
                    repo_id: Some(repo.id),
                    issue_id: Some(issue.id),
                    pull_id: None,
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn handle_issue_comment(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            if let Some(comment) = self.db.get_issue_comment(&event.did, &event.rkey).await? {
                self.db
                    .delete_issue_comment(comment.issue_id, comment.comment_id)
                    .await?;
            }
            return Ok(());
        }
        let record: IssueCommentRecord = decode(event)?;
        let issue = self.validator.validate_issue_comment(&record).await?;

        match self.db.get_issue_comment(&event.did, &event.rkey).await? {
            Some(existing) => {
                self.db
                    .edit_issue_comment(existing.issue_id, existing.comment_id, &record.body)
                    .await?;
            }
            None => {
                self.db
                    .add_issue_comment(
                        &issue,
                        &event.did,
                        Some(&event.rkey),
                        &record.body,
                        record.created_at,
                    )
                    .await?;
            }
        }

        if let Some(repo) = self.db.get_repo_by_at_uri(&issue.repo_at).await? {
            let mentions = extract_references(&repo.did, &repo.name, &record.body);
            let targets = self.db.resolve_references(&mentions).await?;
            self.db.put_references(&event.at_uri(), &targets).await?;
        }

        let prefs = self
            .db
            .get_notification_preferences(&issue.owner_did)
            .await?;
        if prefs.issue_commented && issue.owner_did != event.did {
            self.db
                .create_notification(NewNotification {
                    recipient_did: issue.owner_did.clone(),
                    actor_did: event.did.clone(),
                    r#type: "issue_commented".into(),
                    entity_type: "issue".into(),
                    entity_id: issue.issue_id.to_string(),
                    repo_id: None,
                    issue_id: Some(issue.id),
                    pull_id: None,
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn handle_label_definition(&self, event: &IngestEvent) -> Result<(), AppError> {
        if event.op == RecordOp::Delete {
            self.db
                .delete_label_definition(&event.did, &event.rkey)
                .await?;
            return Ok(());
        }
        let record: LabelDefinitionRecord = decode(event)?;
        self.validator.validate_label_definition(&record)?;
        self.db
            .put_label_definition(NewLabelDefinition {
                did: event.did.clone(),
                rkey: event.rkey.clone(),
                name: record.name,
                value_type: record.value_type,
                value_format: record.value_format,
                value_enum: record.value_enum,
                scope: record.scope,
                color: record.color,
                multiple: record.multiple,
                created: record.created_at,
            })
            .await?;
        Ok(())
    }
}
