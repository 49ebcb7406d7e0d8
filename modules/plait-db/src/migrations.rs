//! Named, forward-only migrations.
//!
//! The idempotent DDL in [`crate::schema`] always creates the latest shape,
//! so on a fresh store every migration here reduces to "record as applied".
//! On an existing store each migration checks its own precondition and
//! rewrites what the DDL cannot. Completion is recorded in the
//! `migrations(name unique)` table; a failure aborts startup.

use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use tracing::{error, info};

use crate::error::{DbError, Result};

struct Migration {
    name: &'static str,
    step: Step,
}

enum Step {
    /// Additive ALTERs, skipped when `column` already exists on `table`.
    /// Runs inside a transaction.
    AddColumn {
        table: &'static str,
        column: &'static str,
        statements: &'static [&'static str],
    },
    /// Pull-table widening for stacked PRs. A full table rewrite: the only
    /// step that cannot run inside a transaction because it toggles
    /// foreign-key enforcement around the copy.
    WidenPulls,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "2024-11-repos-add-spindle",
        step: Step::AddColumn {
            table: "repos",
            column: "spindle",
            statements: &["alter table repos add column spindle text"],
        },
    },
    Migration {
        name: "2025-02-pulls-widen-for-stacking",
        step: Step::WidenPulls,
    },
    Migration {
        name: "2025-04-notification-preferences-add-email",
        step: Step::AddColumn {
            table: "notification_preferences",
            column: "email_notifications",
            statements: &[
                "alter table notification_preferences add column email_notifications integer not null default 0",
            ],
        },
    },
];

pub(crate) async fn run(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    for migration in MIGRATIONS {
        if is_applied(&mut conn, migration.name).await? {
            continue;
        }
        let applied = match &migration.step {
            Step::AddColumn {
                table,
                column,
                statements,
            } => add_column(&mut conn, migration.name, table, column, statements).await,
            Step::WidenPulls => widen_pulls(&mut conn, migration.name).await,
        };
        if let Err(err) = applied {
            error!(name = migration.name, %err, "migration failed, aborting startup");
            return Err(err);
        }
        info!(name = migration.name, "migration applied");
    }
    Ok(())
}

async fn is_applied(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let row = sqlx::query("select 1 from migrations where name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn record(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    sqlx::query("insert into migrations (name) values (?)")
        .bind(name)
        .execute(conn)
        .await?;
    Ok(())
}

async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> Result<bool> {
    let row = sqlx::query("select count(*) as n from pragma_table_info(?) where name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(conn)
        .await?;
    Ok(row.get::<i64, _>("n") > 0)
}

async fn add_column(
    conn: &mut SqliteConnection,
    name: &'static str,
    table: &str,
    column: &str,
    statements: &[&str],
) -> Result<()> {
    let mut tx = conn.begin().await?;
    if !column_exists(&mut tx, table, column).await? {
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .map_err(|source| DbError::Migration { name, source })?;
        }
    }
    record(&mut tx, name).await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrite `pulls` to carry `stack_id` / `change_id` / `parent_change_id`.
///
/// Foreign keys must be off for the drop-and-rename so the child tables
/// (`pull_submissions`, `pull_comments`) keep their rows; a pre-/post-count
/// guards against losing them.
async fn widen_pulls(conn: &mut SqliteConnection, name: &'static str) -> Result<()> {
    if column_exists(conn, "pulls", "stack_id").await? {
        record(conn, name).await?;
        return Ok(());
    }

    let children_before = child_row_counts(conn).await?;

    sqlx::query("pragma foreign_keys = off")
        .execute(&mut *conn)
        .await?;

    let statements = [
        r#"
        create table pulls_new (
            id integer primary key autoincrement,
            pull_id integer not null,
            repo_at text not null references repos(at_uri) on delete cascade,
            owner_did text not null,
            rkey text not null,
            title text not null,
            body text not null,
            target_branch text not null,
            state integer not null default 1,
            source_branch text,
            source_repo_at text,
            stack_id text,
            change_id text,
            parent_change_id text,
            created text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            unique(repo_at, pull_id)
        )
        "#,
        r#"
        insert into pulls_new (id, pull_id, repo_at, owner_did, rkey, title, body,
                               target_branch, state, source_branch, source_repo_at, created)
        select id, pull_id, repo_at, owner_did, rkey, title, body,
               target_branch, state, source_branch, source_repo_at, created
        from pulls
        "#,
        "drop table pulls",
        "alter table pulls_new rename to pulls",
        "create index if not exists idx_pulls_repo on pulls(repo_at)",
        "create index if not exists idx_pulls_stack on pulls(stack_id)",
    ];
    for stmt in statements {
        if let Err(source) = sqlx::query(stmt).execute(&mut *conn).await {
            // Best effort: leave enforcement on even when the rewrite failed.
            let _ = sqlx::query("pragma foreign_keys = on")
                .execute(&mut *conn)
                .await;
            return Err(DbError::Migration { name, source });
        }
    }

    sqlx::query("pragma foreign_keys = on")
        .execute(&mut *conn)
        .await?;

    let children_after = child_row_counts(conn).await?;
    if children_before != children_after {
        return Err(DbError::Integrity(format!(
            "pull rewrite lost child rows: {children_before:?} -> {children_after:?}"
        )));
    }

    record(conn, name).await?;
    Ok(())
}

async fn child_row_counts(conn: &mut SqliteConnection) -> Result<(i64, i64)> {
    let submissions = sqlx::query("select count(*) as n from pull_submissions")
        .fetch_one(&mut *conn)
        .await?
        .get::<i64, _>("n");
    let comments = sqlx::query("select count(*) as n from pull_comments")
        .fetch_one(&mut *conn)
        .await?
        .get::<i64, _>("n");
    Ok((submissions, comments))
}
