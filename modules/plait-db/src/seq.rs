//! Per-repository monotonic counters for issue and pull numbering.
//!
//! Ids are dense, strictly increasing per repo and never reused. Both steps
//! run on the caller's transaction so the counter bump and the row that
//! consumes it commit or roll back together; concurrent creates on the same
//! repo serialise on the counter row.

use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, Result};

pub(crate) async fn next_issue_id(conn: &mut SqliteConnection, repo_at: &str) -> Result<i64> {
    next(conn, repo_at, "next_issue_id").await
}

pub(crate) async fn next_pull_id(conn: &mut SqliteConnection, repo_at: &str) -> Result<i64> {
    next(conn, repo_at, "next_pull_id").await
}

async fn next(conn: &mut SqliteConnection, repo_at: &str, column: &str) -> Result<i64> {
    sqlx::query("insert into repo_seqs (repo_at) values (?) on conflict(repo_at) do nothing")
        .bind(repo_at)
        .execute(&mut *conn)
        .await?;

    let sql = format!("update repo_seqs set {column} = {column} + 1 where repo_at = ? returning {column} - 1");
    let row = sqlx::query(&sql)
        .bind(repo_at)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(row.get::<i64, _>(0)),
        None => Err(DbError::Integrity(format!(
            "missing sequence row for {repo_at}"
        ))),
    }
}
