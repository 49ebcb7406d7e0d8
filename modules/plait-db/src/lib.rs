//! Embedded relational index for the plait appview.
//!
//! One SQLite store per process. Everything the appview serves is a read
//! over this index; everything it learns from the firehose and the knot
//! streams is a write into it. All consumers go through the typed
//! repository methods on [`Db`]; raw SQL never leaves this crate.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

pub mod artifacts;
pub mod collaborators;
pub mod cursor;
pub mod emails;
mod error;
pub mod filter;
pub mod follows;
pub mod issues;
pub mod labels;
mod migrations;
pub mod notifications;
pub mod oauth;
pub mod pipelines;
pub mod profiles;
pub mod pubkeys;
pub mod pulls;
pub mod punches;
pub mod refs;
pub mod registrations;
pub mod repos;
mod schema;
mod seq;
pub mod spindles;
pub mod stars;
pub mod strings;
pub mod timeline;

pub use error::{DbError, Result};
pub use filter::{Filter, FilterValue};

/// Handle on the embedded store. Cheap to clone; shared process-wide.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the store at `path`, apply the DDL and
    /// run pending migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(DbError::Sqlx)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .auto_vacuum(SqliteAutoVacuum::Incremental)
            .page_size(4096)
            .pragma("temp_store", "memory")
            .pragma("mmap_size", "268435456");

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;
        info!(path, "store opened");
        Ok(db)
    }

    /// In-memory store for tests. Single connection: an in-memory SQLite
    /// database is private to its connection.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::Sqlx)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        for ddl in schema::SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction. Multi-statement handlers commit or roll
    /// back as a whole; dropping the transaction rolls back.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }
}
