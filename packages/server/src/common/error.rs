//! Error taxonomy shared by every matchmaking component.
//!
//! | Variant | Meaning | Caller action |
//! |---|---|---|
//! | `NotFound` | referenced entity absent | show message |
//! | `InvalidState` | entity not in the required lifecycle state | show message |
//! | `InvalidTransition` | terminal or uniqueness rule violated | show message |
//! | `InvalidInput` | malformed argument (cursor, empty name) | fix request |
//! | `Transient` | store temporarily unavailable | retry with same arguments |
//! | `Internal` | broken invariant | never retried, logged loudly |
//! | `MissingDependency` | component requested outside its owning scope | programming error |

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = MatchmakingError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store temporarily unavailable: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),
}

/// Serializable discriminant of [`MatchmakingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidTransition,
    InvalidInput,
    Transient,
    Internal,
    MissingDependency,
}

impl MatchmakingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Self::InvalidState(what.into())
    }

    pub fn invalid_transition(what: impl Into<String>) -> Self {
        Self::InvalidTransition(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Internal(_) => ErrorKind::Internal,
            Self::MissingDependency(_) => ErrorKind::MissingDependency,
        }
    }

    /// Only `Transient` failures may be retried with unchanged parameters.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for MatchmakingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => Self::Transient(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Error body returned to API clients and stored in session snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MatchmakingError> for ErrorReport {
    fn from(err: &MatchmakingError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
