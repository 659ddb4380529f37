// src/error.rs
// Closed error taxonomy shared by every subsystem of the core.
//
// Subsystems convert their own errors into `CoreError` at the boundary
// (`From` impls below) so call sites in the expert runtime can branch on
// `kind()`/`retryable()` without matching on storage- or transport-specific
// variants.

use serde::Serialize;
use thiserror::Error;

/// The closed set of error kinds the core reports across its taxonomy.
/// Kept separate from `CoreError` so the wire representation
/// (`{kind, message, retryable}`) doesn't have to carry the `thiserror`
/// display machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    Busy,
    NotFound,
    Conflict,
    Transient,
    TimedOut,
    SchemaMismatch,
    Configuration,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session busy")]
    Busy,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CoreError::Busy => ErrorKind::Busy,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Transient(_) => ErrorKind::Transient,
            CoreError::TimedOut(_) => ErrorKind::TimedOut,
            CoreError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            CoreError::Configuration(_) => ErrorKind::Configuration,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the expert runtime may retry the operation that raised this.
    /// Only transient and idempotent-write-safe failures are retryable; a
    /// non-idempotent write that fails must never be retried blindly.
    pub fn retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::TimedOut)
    }

    /// Whether this error must propagate out of the expert loop rather than
    /// be captured as a tool-role message.
    pub fn is_fatal_to_turn(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Internal)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The structured `{kind, message, retryable}` object returned to callers.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CoreError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                CoreError::Transient(e.to_string())
            }
            _ => CoreError::Internal(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoreError::TimedOut(e.to_string())
        } else if e.is_connect() || e.is_request() {
            CoreError::Transient(e.to_string())
        } else {
            CoreError::Internal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidArgument(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
