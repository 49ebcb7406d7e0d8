use thiserror::Error;

/// Error taxonomy shared across the appview.
///
/// Kinds, not concrete types: lower layers wrap their own failures into one
/// of these so the dispatcher and (out-of-scope) HTTP edge can translate
/// uniformly. `NoOp` never crosses a module boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique violation or stale swap-cid.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Bounds, missing fields, bad enum values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Upstream HTTP, PDS or knot failure.
    #[error("dependency failure: {0}")]
    Dependency(String),

    /// Foreign-key violation, missing sequence row.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Busy/locked store; safe to retry.
    #[error("transient: {0}")]
    Transient(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}
