//! Issues and issue comments. Issue numbers come from the per-repo
//! sequence counter; comment ids are dense per issue.

use plait_common::Page;
use sqlx::{FromRow, Row, SqliteConnection};

use crate::error::{DbError, Result};
use crate::filter::{self, Filter};
use crate::{seq, Db};

#[derive(Debug, Clone, FromRow)]
pub struct Issue {
    pub id: i64,
    pub owner_did: String,
    pub repo_at: String,
    pub issue_id: i64,
    pub title: String,
    pub body: String,
    pub open: bool,
    pub created: String,
    /// Record URI when the issue was authored through the firehose.
    pub issue_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub owner_did: String,
    pub repo_at: String,
    pub title: String,
    pub body: String,
    pub issue_at: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct IssueComment {
    pub id: i64,
    pub owner_did: String,
    pub issue_id: i64,
    pub repo_at: String,
    pub comment_id: i64,
    pub rkey: Option<String>,
    pub body: String,
    pub created: String,
    pub edited: Option<String>,
    pub deleted: Option<String>,
}

/// Listing row: an issue plus its live comment count.
#[derive(Debug, Clone, FromRow)]
pub struct IssueWithCount {
    #[sqlx(flatten)]
    pub issue: Issue,
    pub comment_count: i64,
}

impl Db {
    /// Create an issue, allocating the next dense `issue_id` for the repo.
    /// Counter bump and insert commit atomically.
    pub async fn create_issue(&self, new: NewIssue) -> Result<Issue> {
        let mut tx = self.begin().await?;
        let issue = insert_issue(&mut tx, &new).await?;
        tx.commit().await?;
        Ok(issue)
    }

    /// Idempotent ingest write: update in place when the record URI is
    /// already indexed, otherwise create.
    pub async fn put_issue(&self, new: NewIssue) -> Result<Issue> {
        if let Some(uri) = new.issue_at.as_deref() {
            let existing = sqlx::query_as::<_, Issue>(
                "update issues set title = ?, body = ? where issue_at = ? returning *",
            )
            .bind(&new.title)
            .bind(&new.body)
            .bind(uri)
            .fetch_optional(self.pool())
            .await?;
            if let Some(issue) = existing {
                return Ok(issue);
            }
        }
        self.create_issue(new).await
    }

    pub async fn get_issue(&self, repo_at: &str, issue_id: i64) -> Result<Option<Issue>> {
        let issue =
            sqlx::query_as::<_, Issue>("select * from issues where repo_at = ? and issue_id = ?")
                .bind(repo_at)
                .bind(issue_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(issue)
    }

    pub async fn get_issue_by_at_uri(&self, issue_at: &str) -> Result<Option<Issue>> {
        let issue = sqlx::query_as::<_, Issue>("select * from issues where issue_at = ?")
            .bind(issue_at)
            .fetch_optional(self.pool())
            .await?;
        Ok(issue)
    }

    /// Windowed listing with comment counts, `created desc`. Pagination
    /// runs over a `row_number()` window so the offset survives the
    /// subquery join.
    pub async fn get_issues(
        &self,
        filters: &[Filter],
        page: Page,
    ) -> Result<Vec<IssueWithCount>> {
        let (where_sql, args) = filter::where_clause(filters);
        let sql = format!(
            r#"
            select * from (
                select i.*,
                       (select count(*) from issue_comments c
                         where c.issue_id = i.id and c.deleted is null) as comment_count,
                       row_number() over (order by i.created desc, i.id desc) as rn
                from issues i{where_sql}
            ) where rn > {} and rn <= {}
            order by rn
            "#,
            page.offset,
            page.offset + page.limit,
        );
        let mut query = sqlx::query_as::<_, IssueWithCount>(&sql);
        for arg in &args {
            query = filter::bind(query, arg);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    pub async fn set_issue_open(&self, repo_at: &str, issue_id: i64, open: bool) -> Result<()> {
        let res = sqlx::query("update issues set open = ? where repo_at = ? and issue_id = ?")
            .bind(open)
            .bind(repo_at)
            .bind(issue_id)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("issue {repo_at}#{issue_id}")));
        }
        Ok(())
    }

    /// Idempotent delete by record URI; a missing row is already deleted.
    pub async fn delete_issue(&self, issue_at: &str) -> Result<()> {
        sqlx::query("delete from issues where issue_at = ?")
            .bind(issue_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // --- Comments ---

    /// Insert a comment, allocating the next `comment_id` on the issue.
    pub async fn add_issue_comment(
        &self,
        issue: &Issue,
        owner_did: &str,
        rkey: Option<&str>,
        body: &str,
        created: Option<String>,
    ) -> Result<IssueComment> {
        let mut tx = self.begin().await?;
        let next: i64 = sqlx::query(
            "select coalesce(max(comment_id) + 1, 1) as next from issue_comments where issue_id = ?",
        )
        .bind(issue.id)
        .fetch_one(&mut *tx)
        .await?
        .get("next");

        let created = created.unwrap_or_else(plait_common::now_rfc3339);
        let comment = sqlx::query_as::<_, IssueComment>(
            r#"
            insert into issue_comments (owner_did, issue_id, repo_at, comment_id, rkey, body, created)
            values (?, ?, ?, ?, ?, ?, ?)
            returning *
            "#,
        )
        .bind(owner_did)
        .bind(issue.id)
        .bind(&issue.repo_at)
        .bind(next)
        .bind(rkey)
        .bind(body)
        .bind(&created)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(comment)
    }

    pub async fn edit_issue_comment(
        &self,
        issue_id: i64,
        comment_id: i64,
        body: &str,
    ) -> Result<()> {
        let res = sqlx::query(
            "update issue_comments set body = ?, edited = ? where issue_id = ? and comment_id = ? and deleted is null",
        )
        .bind(body)
        .bind(plait_common::now_rfc3339())
        .bind(issue_id)
        .bind(comment_id)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "comment {comment_id} on issue row {issue_id}"
            )));
        }
        Ok(())
    }

    /// Soft delete: the row survives so the thread keeps its shape.
    pub async fn delete_issue_comment(&self, issue_id: i64, comment_id: i64) -> Result<()> {
        let res = sqlx::query(
            "update issue_comments set body = '', deleted = ? where issue_id = ? and comment_id = ? and deleted is null",
        )
        .bind(plait_common::now_rfc3339())
        .bind(issue_id)
        .bind(comment_id)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "comment {comment_id} on issue row {issue_id}"
            )));
        }
        Ok(())
    }

    pub async fn get_issue_comment(
        &self,
        owner_did: &str,
        rkey: &str,
    ) -> Result<Option<IssueComment>> {
        let comment = sqlx::query_as::<_, IssueComment>(
            "select * from issue_comments where owner_did = ? and rkey = ?",
        )
        .bind(owner_did)
        .bind(rkey)
        .fetch_optional(self.pool())
        .await?;
        Ok(comment)
    }

    pub async fn get_issue_comments(&self, issue_row_id: i64) -> Result<Vec<IssueComment>> {
        let rows = sqlx::query_as::<_, IssueComment>(
            "select * from issue_comments where issue_id = ? order by created asc, comment_id asc",
        )
        .bind(issue_row_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

async fn insert_issue(conn: &mut SqliteConnection, new: &NewIssue) -> Result<Issue> {
    let issue_id = seq::next_issue_id(conn, &new.repo_at).await?;
    let created = new
        .created
        .clone()
        .unwrap_or_else(plait_common::now_rfc3339);
    let issue = sqlx::query_as::<_, Issue>(
        r#"
        insert into issues (owner_did, repo_at, issue_id, title, body, open, created, issue_at)
        values (?, ?, ?, ?, ?, 1, ?, ?)
        returning *
        "#,
    )
    .bind(&new.owner_did)
    .bind(&new.repo_at)
    .bind(issue_id)
    .bind(&new.title)
    .bind(&new.body)
    .bind(&created)
    .bind(&new.issue_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(issue)
}
