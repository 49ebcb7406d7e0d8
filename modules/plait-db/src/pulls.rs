//! Pull requests: submission rounds, comments, state machine, stacks.
//!
//! A pull always has at least one submission (round 0 is written with the
//! pull). Merged and Deleted are terminal states. Stacked pulls share a
//! `stack_id` and chain through `parent_change_id`.

use std::collections::{HashMap, HashSet};

use plait_common::Page;
use sqlx::{FromRow, Row, SqliteConnection};

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::{seq, Db};

/// Pull lifecycle. Stored as the integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum PullState {
    Closed = 0,
    Open = 1,
    Merged = 2,
    Deleted = 3,
}

impl PullState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, PullState::Merged | PullState::Deleted)
    }
}

impl TryFrom<i64> for PullState {
    type Error = DbError;

    fn try_from(v: i64) -> Result<Self> {
        match v {
            0 => Ok(PullState::Closed),
            1 => Ok(PullState::Open),
            2 => Ok(PullState::Merged),
            3 => Ok(PullState::Deleted),
            other => Err(DbError::Integrity(format!("unknown pull state {other}"))),
        }
    }
}

impl std::fmt::Display for PullState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PullState::Closed => "closed",
            PullState::Open => "open",
            PullState::Merged => "merged",
            PullState::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Pull {
    pub id: i64,
    pub pull_id: i64,
    pub repo_at: String,
    pub owner_did: String,
    pub rkey: String,
    pub title: String,
    pub body: String,
    pub target_branch: String,
    pub state: i64,
    pub source_branch: Option<String>,
    pub source_repo_at: Option<String>,
    pub stack_id: Option<String>,
    pub change_id: Option<String>,
    pub parent_change_id: Option<String>,
    pub created: String,
}

impl Pull {
    pub fn state(&self) -> Result<PullState> {
        PullState::try_from(self.state)
    }
}

#[derive(Debug, Clone)]
pub struct NewPull {
    pub repo_at: String,
    pub owner_did: String,
    pub rkey: String,
    pub title: String,
    pub body: String,
    pub target_branch: String,
    pub source_branch: Option<String>,
    pub source_repo_at: Option<String>,
    pub stack_id: Option<String>,
    pub change_id: Option<String>,
    pub parent_change_id: Option<String>,
    /// Round-0 patch.
    pub patch: String,
    pub source_rev: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PullSubmission {
    pub id: i64,
    pub pull_id: i64,
    pub round_number: i64,
    pub patch: String,
    pub source_rev: Option<String>,
    pub created: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct PullComment {
    pub id: i64,
    pub pull_id: i64,
    pub submission_id: i64,
    pub repo_at: String,
    pub owner_did: String,
    pub comment_at: String,
    pub body: String,
    pub created: String,
}

/// A submission hydrated with its comments, `created asc`.
#[derive(Debug, Clone)]
pub struct SubmissionWithComments {
    pub submission: PullSubmission,
    pub comments: Vec<PullComment>,
}

/// A pull hydrated with its submission rounds, 0-indexed ascending.
#[derive(Debug, Clone)]
pub struct PullDetail {
    pub pull: Pull,
    pub submissions: Vec<SubmissionWithComments>,
}

impl Db {
    /// Create a pull with its round-0 submission, allocating the next
    /// dense `pull_id` for the repo. All three writes commit atomically.
    pub async fn create_pull(&self, new: NewPull) -> Result<Pull> {
        let mut tx = self.begin().await?;
        let pull_id = seq::next_pull_id(&mut tx, &new.repo_at).await?;
        let created = new
            .created
            .clone()
            .unwrap_or_else(plait_common::now_rfc3339);
        let pull = sqlx::query_as::<_, Pull>(
            r#"
            insert into pulls (pull_id, repo_at, owner_did, rkey, title, body, target_branch,
                               state, source_branch, source_repo_at, stack_id, change_id,
                               parent_change_id, created)
            values (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?)
            returning *
            "#,
        )
        .bind(pull_id)
        .bind(&new.repo_at)
        .bind(&new.owner_did)
        .bind(&new.rkey)
        .bind(&new.title)
        .bind(&new.body)
        .bind(&new.target_branch)
        .bind(&new.source_branch)
        .bind(&new.source_repo_at)
        .bind(&new.stack_id)
        .bind(&new.change_id)
        .bind(&new.parent_change_id)
        .bind(&created)
        .fetch_one(&mut *tx)
        .await?;

        insert_submission(&mut tx, pull.id, 0, &new.patch, new.source_rev.as_deref(), &created)
            .await?;
        tx.commit().await?;
        Ok(pull)
    }

    /// Append a new submission round. Rounds are strictly increasing from 0.
    pub async fn resubmit_pull(
        &self,
        pull_row_id: i64,
        patch: &str,
        source_rev: Option<&str>,
    ) -> Result<PullSubmission> {
        let mut tx = self.begin().await?;
        let next: i64 = sqlx::query(
            "select coalesce(max(round_number) + 1, 0) as next from pull_submissions where pull_id = ?",
        )
        .bind(pull_row_id)
        .fetch_one(&mut *tx)
        .await?
        .get("next");

        let created = plait_common::now_rfc3339();
        let submission =
            insert_submission(&mut tx, pull_row_id, next, patch, source_rev, &created).await?;
        tx.commit().await?;
        Ok(submission)
    }

    pub async fn get_pull_row(&self, repo_at: &str, pull_id: i64) -> Result<Option<Pull>> {
        let pull =
            sqlx::query_as::<_, Pull>("select * from pulls where repo_at = ? and pull_id = ?")
                .bind(repo_at)
                .bind(pull_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(pull)
    }

    /// Hydrated read: the pull, its submissions ascending by round, and
    /// each submission's comments ascending by creation.
    pub async fn get_pull(&self, repo_at: &str, pull_id: i64) -> Result<Option<PullDetail>> {
        let Some(pull) = self.get_pull_row(repo_at, pull_id).await? else {
            return Ok(None);
        };

        let submissions = sqlx::query_as::<_, PullSubmission>(
            "select * from pull_submissions where pull_id = ? order by round_number asc",
        )
        .bind(pull.id)
        .fetch_all(self.pool())
        .await?;

        let comments = sqlx::query_as::<_, PullComment>(
            "select * from pull_comments where pull_id = ? order by created asc, id asc",
        )
        .bind(pull.id)
        .fetch_all(self.pool())
        .await?;

        let mut by_submission: HashMap<i64, Vec<PullComment>> = HashMap::new();
        for comment in comments {
            by_submission
                .entry(comment.submission_id)
                .or_default()
                .push(comment);
        }

        let submissions = submissions
            .into_iter()
            .map(|submission| {
                let comments = by_submission.remove(&submission.id).unwrap_or_default();
                SubmissionWithComments {
                    submission,
                    comments,
                }
            })
            .collect();

        Ok(Some(PullDetail { pull, submissions }))
    }

    pub async fn list_pulls(&self, filters: &[Filter], page: Option<Page>) -> Result<Vec<Pull>> {
        let (where_sql, args) = filter::where_clause(filters);
        let mut sql = format!("select * from pulls{where_sql} order by created desc");
        if let Some(page) = page {
            sql.push_str(&format!(" limit {} offset {}", page.limit, page.offset));
        }
        let mut query = sqlx::query_as::<_, Pull>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Transition a pull's state. Merged and Deleted are terminal: a
    /// transition out of either is ignored and the stored state is
    /// returned unchanged.
    pub async fn set_pull_state(
        &self,
        repo_at: &str,
        pull_id: i64,
        state: PullState,
    ) -> Result<PullState> {
        sqlx::query(
            "update pulls set state = ? where repo_at = ? and pull_id = ? and state not in (2, 3)",
        )
        .bind(state as i64)
        .bind(repo_at)
        .bind(pull_id)
        .execute(self.pool())
        .await?;

        let stored: i64 =
            sqlx::query("select state from pulls where repo_at = ? and pull_id = ?")
                .bind(repo_at)
                .bind(pull_id)
                .fetch_optional(self.pool())
                .await?
                .ok_or_else(|| DbError::NotFound(format!("pull {repo_at}#{pull_id}")))?
                .get("state");
        PullState::try_from(stored)
    }

    pub async fn merge_pull(&self, repo_at: &str, pull_id: i64) -> Result<PullState> {
        self.set_pull_state(repo_at, pull_id, PullState::Merged).await
    }

    pub async fn close_pull(&self, repo_at: &str, pull_id: i64) -> Result<PullState> {
        self.set_pull_state(repo_at, pull_id, PullState::Closed).await
    }

    pub async fn reopen_pull(&self, repo_at: &str, pull_id: i64) -> Result<PullState> {
        self.set_pull_state(repo_at, pull_id, PullState::Open).await
    }

    /// Deletion from the log: the row is kept (children may reference it)
    /// and the state goes terminal, unless it already was.
    pub async fn delete_pull(&self, repo_at: &str, pull_id: i64) -> Result<PullState> {
        self.set_pull_state(repo_at, pull_id, PullState::Deleted).await
    }

    // --- Comments ---

    pub async fn add_pull_comment(
        &self,
        pull_row_id: i64,
        submission_id: i64,
        repo_at: &str,
        owner_did: &str,
        comment_at: &str,
        body: &str,
        created: Option<String>,
    ) -> Result<PullComment> {
        let created = created.unwrap_or_else(plait_common::now_rfc3339);
        let comment = sqlx::query_as::<_, PullComment>(
            r#"
            insert into pull_comments (pull_id, submission_id, repo_at, owner_did, comment_at, body, created)
            values (?, ?, ?, ?, ?, ?, ?)
            returning *
            "#,
        )
        .bind(pull_row_id)
        .bind(submission_id)
        .bind(repo_at)
        .bind(owner_did)
        .bind(comment_at)
        .bind(body)
        .bind(&created)
        .fetch_one(self.pool())
        .await?;
        Ok(comment)
    }

    pub async fn get_pull_comment_by_at_uri(&self, comment_at: &str) -> Result<Option<PullComment>> {
        let comment =
            sqlx::query_as::<_, PullComment>("select * from pull_comments where comment_at = ?")
                .bind(comment_at)
                .fetch_optional(self.pool())
                .await?;
        Ok(comment)
    }

    // --- Stacks ---

    /// Reconstruct a stack as a linear chain, top first.
    ///
    /// The top is the unique member whose `change_id` no other member
    /// names as parent; iteration then follows `parent_change_id` to the
    /// bottom. A forked or cyclic chain is an integrity error.
    pub async fn get_stack(&self, stack_id: &str) -> Result<Vec<Pull>> {
        let members = sqlx::query_as::<_, Pull>(
            "select * from pulls where stack_id = ? and state <> 3",
        )
        .bind(stack_id)
        .fetch_all(self.pool())
        .await?;
        if members.is_empty() {
            return Ok(vec![]);
        }

        let by_change: HashMap<&str, &Pull> = members
            .iter()
            .filter_map(|p| p.change_id.as_deref().map(|c| (c, p)))
            .collect();
        if by_change.len() != members.len() {
            return Err(DbError::Integrity(format!(
                "stack {stack_id} has members without distinct change ids"
            )));
        }

        let parents: HashSet<&str> = members
            .iter()
            .filter_map(|p| p.parent_change_id.as_deref())
            .collect();

        let mut tops = members
            .iter()
            .filter(|p| p.change_id.as_deref().is_some_and(|c| !parents.contains(c)));
        let top = tops
            .next()
            .ok_or_else(|| DbError::Integrity(format!("stack {stack_id} has no top")))?;
        if tops.next().is_some() {
            return Err(DbError::Integrity(format!(
                "stack {stack_id} is not a linear chain"
            )));
        }

        let mut ordered = Vec::with_capacity(members.len());
        let mut cursor = Some(top);
        let mut seen = HashSet::new();
        while let Some(pull) = cursor {
            if !seen.insert(pull.id) {
                return Err(DbError::Integrity(format!("stack {stack_id} has a cycle")));
            }
            ordered.push(pull.clone());
            cursor = pull
                .parent_change_id
                .as_deref()
                .and_then(|parent| by_change.get(parent).copied());
        }

        if ordered.len() != members.len() {
            return Err(DbError::Integrity(format!(
                "stack {stack_id} does not reach every member"
            )));
        }
        Ok(ordered)
    }
}

async fn insert_submission(
    conn: &mut SqliteConnection,
    pull_row_id: i64,
    round: i64,
    patch: &str,
    source_rev: Option<&str>,
    created: &str,
) -> Result<PullSubmission> {
    let submission = sqlx::query_as::<_, PullSubmission>(
        r#"
        insert into pull_submissions (pull_id, round_number, patch, source_rev, created)
        values (?, ?, ?, ?, ?)
        returning *
        "#,
    )
    .bind(pull_row_id)
    .bind(round)
    .bind(patch)
    .bind(source_rev)
    .bind(created)
    .fetch_one(&mut *conn)
    .await?;
    Ok(submission)
}
