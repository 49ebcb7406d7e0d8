use plait_common::AppError;
use thiserror::Error;

/// Store-level failures, bucketed into the shared taxonomy before they
/// leave this crate.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Foreign-key or check-constraint violation, or a missing counter row.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The store is busy or locked; the write can be retried.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Bounds or enumeration checks done above the schema.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("migration `{name}` failed: {source}")]
    Migration {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

// SQLITE_BUSY / SQLITE_LOCKED primary result codes.
const BUSY_CODES: [&str; 3] = ["5", "6", "517"];

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound("row not found".into()),
            sqlx::Error::Database(db) => {
                use sqlx::error::ErrorKind;
                match db.kind() {
                    ErrorKind::UniqueViolation => DbError::Conflict(db.message().to_string()),
                    ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => DbError::Integrity(db.message().to_string()),
                    _ => {
                        let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                        if BUSY_CODES.contains(&code.as_str()) {
                            DbError::Transient(db.message().to_string())
                        } else {
                            DbError::Sqlx(err)
                        }
                    }
                }
            }
            _ => DbError::Sqlx(err),
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(m) => AppError::NotFound(m),
            DbError::Conflict(m) => AppError::Conflict(m),
            DbError::Integrity(m) => AppError::Integrity(m),
            DbError::Transient(m) => AppError::Transient(m),
            DbError::Validation(m) => AppError::Validation(m),
            other => AppError::Other(other.into()),
        }
    }
}
