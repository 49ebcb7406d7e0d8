//! Notifications: creation, read/unread bookkeeping, entity-joined
//! listing, preferences and retention cleanup.

use chrono::{Duration, Utc};
use plait_common::Page;
use sqlx::FromRow;

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::issues::Issue;
use crate::pulls::Pull;
use crate::repos::Repo;
use crate::Db;

#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: i64,
    pub recipient_did: String,
    pub actor_did: String,
    #[sqlx(rename = "type")]
    pub r#type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub read: bool,
    pub created: String,
    pub repo_id: Option<i64>,
    pub issue_id: Option<i64>,
    pub pull_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_did: String,
    pub actor_did: String,
    pub r#type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub repo_id: Option<i64>,
    pub issue_id: Option<i64>,
    pub pull_id: Option<i64>,
}

/// A notification with whichever referenced entities still exist.
#[derive(Debug, Clone)]
pub struct NotificationWithEntities {
    pub notification: Notification,
    pub repo: Option<Repo>,
    pub issue: Option<Issue>,
    pub pull: Option<Pull>,
}

/// Per-user delivery switches. The default row is synthesised (not
/// inserted) for users who never saved preferences.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationPreferences {
    pub user_did: String,
    pub repo_starred: bool,
    pub user_followed: bool,
    pub issue_created: bool,
    pub issue_commented: bool,
    pub pull_created: bool,
    pub pull_commented: bool,
    pub pull_merged: bool,
    pub email_notifications: bool,
}

impl NotificationPreferences {
    pub fn default_for(user_did: &str) -> Self {
        Self {
            user_did: user_did.to_string(),
            repo_starred: true,
            user_followed: true,
            issue_created: true,
            issue_commented: true,
            pull_created: true,
            pull_commented: true,
            pull_merged: true,
            email_notifications: false,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct JoinedRow {
    // notification
    id: i64,
    recipient_did: String,
    actor_did: String,
    #[sqlx(rename = "type")]
    r#type: String,
    entity_type: String,
    entity_id: String,
    read: bool,
    created: String,
    repo_id: Option<i64>,
    issue_id: Option<i64>,
    pull_id: Option<i64>,
    // repo (all null when the fk is null or the row is gone)
    r_id: Option<i64>,
    r_did: Option<String>,
    r_name: Option<String>,
    r_knot: Option<String>,
    r_rkey: Option<String>,
    r_at_uri: Option<String>,
    r_description: Option<String>,
    r_spindle: Option<String>,
    r_source: Option<String>,
    r_created: Option<String>,
    // issue
    i_id: Option<i64>,
    i_owner_did: Option<String>,
    i_repo_at: Option<String>,
    i_issue_id: Option<i64>,
    i_title: Option<String>,
    i_body: Option<String>,
    i_open: Option<bool>,
    i_created: Option<String>,
    i_issue_at: Option<String>,
    // pull
    p_id: Option<i64>,
    p_pull_id: Option<i64>,
    p_repo_at: Option<String>,
    p_owner_did: Option<String>,
    p_rkey: Option<String>,
    p_title: Option<String>,
    p_body: Option<String>,
    p_target_branch: Option<String>,
    p_state: Option<i64>,
    p_source_branch: Option<String>,
    p_source_repo_at: Option<String>,
    p_stack_id: Option<String>,
    p_change_id: Option<String>,
    p_parent_change_id: Option<String>,
    p_created: Option<String>,
}

impl JoinedRow {
    fn into_entities(self) -> NotificationWithEntities {
        let repo = match (self.r_id, &self.r_did) {
            (Some(id), Some(_)) => Some(Repo {
                id,
                did: self.r_did.clone().unwrap_or_default(),
                name: self.r_name.clone().unwrap_or_default(),
                knot: self.r_knot.clone().unwrap_or_default(),
                rkey: self.r_rkey.clone().unwrap_or_default(),
                at_uri: self.r_at_uri.clone().unwrap_or_default(),
                description: self.r_description.clone(),
                spindle: self.r_spindle.clone(),
                source: self.r_source.clone(),
                created: self.r_created.clone().unwrap_or_default(),
            }),
            _ => None,
        };
        let issue = match (self.i_id, &self.i_repo_at) {
            (Some(id), Some(_)) => Some(Issue {
                id,
                owner_did: self.i_owner_did.clone().unwrap_or_default(),
                repo_at: self.i_repo_at.clone().unwrap_or_default(),
                issue_id: self.i_issue_id.unwrap_or_default(),
                title: self.i_title.clone().unwrap_or_default(),
                body: self.i_body.clone().unwrap_or_default(),
                open: self.i_open.unwrap_or(true),
                created: self.i_created.clone().unwrap_or_default(),
                issue_at: self.i_issue_at.clone(),
            }),
            _ => None,
        };
        let pull = match (self.p_id, &self.p_repo_at) {
            (Some(id), Some(_)) => Some(Pull {
                id,
                pull_id: self.p_pull_id.unwrap_or_default(),
                repo_at: self.p_repo_at.clone().unwrap_or_default(),
                owner_did: self.p_owner_did.clone().unwrap_or_default(),
                rkey: self.p_rkey.clone().unwrap_or_default(),
                title: self.p_title.clone().unwrap_or_default(),
                body: self.p_body.clone().unwrap_or_default(),
                target_branch: self.p_target_branch.clone().unwrap_or_default(),
                state: self.p_state.unwrap_or(1),
                source_branch: self.p_source_branch.clone(),
                source_repo_at: self.p_source_repo_at.clone(),
                stack_id: self.p_stack_id.clone(),
                change_id: self.p_change_id.clone(),
                parent_change_id: self.p_parent_change_id.clone(),
                created: self.p_created.clone().unwrap_or_default(),
            }),
            _ => None,
        };
        NotificationWithEntities {
            notification: Notification {
                id: self.id,
                recipient_did: self.recipient_did,
                actor_did: self.actor_did,
                r#type: self.r#type,
                entity_type: self.entity_type,
                entity_id: self.entity_id,
                read: self.read,
                created: self.created,
                repo_id: self.repo_id,
                issue_id: self.issue_id,
                pull_id: self.pull_id,
            },
            repo,
            issue,
            pull,
        }
    }
}

impl Db {
    pub async fn create_notification(&self, new: NewNotification) -> Result<i64> {
        let res = sqlx::query(
            r#"
            insert into notifications
                (recipient_did, actor_did, type, entity_type, entity_id, repo_id, issue_id, pull_id)
            values (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.recipient_did)
        .bind(&new.actor_did)
        .bind(&new.r#type)
        .bind(&new.entity_type)
        .bind(&new.entity_id)
        .bind(new.repo_id)
        .bind(new.issue_id)
        .bind(new.pull_id)
        .execute(self.pool())
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn list_notifications(
        &self,
        filters: &[Filter],
        page: Page,
    ) -> Result<Vec<Notification>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!(
            "select * from notifications{where_sql} order by created desc limit {} offset {}",
            page.limit, page.offset
        );
        let mut query = sqlx::query_as::<_, Notification>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Listing with the referenced repo/issue/pull hydrated when present.
    pub async fn list_notifications_with_entities(
        &self,
        recipient_did: &str,
        page: Page,
    ) -> Result<Vec<NotificationWithEntities>> {
        let sql = format!(
            r#"
            select n.id, n.recipient_did, n.actor_did, n.type, n.entity_type, n.entity_id,
                   n.read, n.created, n.repo_id, n.issue_id, n.pull_id,
                   r.id as r_id, r.did as r_did, r.name as r_name, r.knot as r_knot,
                   r.rkey as r_rkey, r.at_uri as r_at_uri, r.description as r_description,
                   r.spindle as r_spindle, r.source as r_source, r.created as r_created,
                   i.id as i_id, i.owner_did as i_owner_did, i.repo_at as i_repo_at,
                   i.issue_id as i_issue_id, i.title as i_title, i.body as i_body,
                   i.open as i_open, i.created as i_created, i.issue_at as i_issue_at,
                   p.id as p_id, p.pull_id as p_pull_id, p.repo_at as p_repo_at,
                   p.owner_did as p_owner_did, p.rkey as p_rkey, p.title as p_title,
                   p.body as p_body, p.target_branch as p_target_branch, p.state as p_state,
                   p.source_branch as p_source_branch, p.source_repo_at as p_source_repo_at,
                   p.stack_id as p_stack_id, p.change_id as p_change_id,
                   p.parent_change_id as p_parent_change_id, p.created as p_created
            from notifications n
            left join repos r on r.id = n.repo_id
            left join issues i on i.id = n.issue_id
            left join pulls p on p.id = n.pull_id
            where n.recipient_did = ?
            order by n.created desc
            limit {} offset {}
            "#,
            page.limit, page.offset
        );
        let rows = sqlx::query_as::<_, JoinedRow>(&sql)
            .bind(recipient_did)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(JoinedRow::into_entities).collect())
    }

    pub async fn unread_notification_count(&self, recipient_did: &str) -> Result<i64> {
        let n: (i64,) = sqlx::query_as(
            "select count(*) from notifications where recipient_did = ? and read = 0",
        )
        .bind(recipient_did)
        .fetch_one(self.pool())
        .await?;
        Ok(n.0)
    }

    pub async fn mark_notification_read(&self, id: i64, recipient_did: &str) -> Result<()> {
        let res = sqlx::query(
            "update notifications set read = 1 where id = ? and recipient_did = ?",
        )
        .bind(id)
        .bind(recipient_did)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "notification {id} not found or access denied"
            )));
        }
        Ok(())
    }

    /// One UPDATE scoped to the recipient's unread rows.
    pub async fn mark_all_notifications_read(&self, recipient_did: &str) -> Result<u64> {
        let res = sqlx::query(
            "update notifications set read = 1 where recipient_did = ? and read = 0",
        )
        .bind(recipient_did)
        .execute(self.pool())
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn delete_notification(&self, id: i64, recipient_did: &str) -> Result<()> {
        let res = sqlx::query("delete from notifications where id = ? and recipient_did = ?")
            .bind(id)
            .bind(recipient_did)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "notification {id} not found or access denied"
            )));
        }
        Ok(())
    }

    /// Retention cleanup: drop everything created at or before
    /// `now - older_than`.
    pub async fn clear_old_notifications(&self, older_than: Duration) -> Result<u64> {
        let cutoff = (Utc::now() - older_than).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let res = sqlx::query("delete from notifications where created <= ?")
            .bind(&cutoff)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected())
    }

    // --- Preferences ---

    pub async fn get_notification_preferences(
        &self,
        user_did: &str,
    ) -> Result<NotificationPreferences> {
        let prefs = sqlx::query_as::<_, NotificationPreferences>(
            "select * from notification_preferences where user_did = ?",
        )
        .bind(user_did)
        .fetch_optional(self.pool())
        .await?;
        Ok(prefs.unwrap_or_else(|| NotificationPreferences::default_for(user_did)))
    }

    pub async fn put_notification_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert or replace into notification_preferences
                (user_did, repo_starred, user_followed, issue_created, issue_commented,
                 pull_created, pull_commented, pull_merged, email_notifications)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&prefs.user_did)
        .bind(prefs.repo_starred)
        .bind(prefs.user_followed)
        .bind(prefs.issue_created)
        .bind(prefs.issue_commented)
        .bind(prefs.pull_created)
        .bind(prefs.pull_commented)
        .bind(prefs.pull_merged)
        .bind(prefs.email_notifications)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
