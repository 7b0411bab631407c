use thiserror::Error;

/// Errors surfaced by every stockbook operation.
///
/// The kinds map one-to-one onto caller semantics (404 / 409 / 400 style)
/// without this crate knowing anything about a transport: `NotFound` for a
/// missing record, `Conflict` for a failed state-machine guard, `Validation`
/// for malformed or missing input, `Db` for driver-level failures wrapped
/// with call-site context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(String),
}

/// Result alias used across the operation surface.
pub type OpResult<T> = Result<T, StoreError>;

impl StoreError {
    /// `NotFound` for a record referenced by id, e.g. `not_found("item", 42)`.
    pub fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
