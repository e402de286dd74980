//! Typed errors shared by every service.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed name, path, size or other request data.
    #[error("{0}")]
    InvalidInput(String),
    /// The resource does not exist, or its existence must not be revealed.
    #[error("{0}")]
    NotFound(String),
    /// The resource exists but the actor lacks the required level.
    #[error("{0}")]
    Denied(String),
    /// Duplicate name or path.
    #[error("{0}")]
    Conflict(String),
    /// Bad credentials, token or signed URL.
    #[error("{0}")]
    Unauthenticated(String),
    /// Storage, transaction or crypto failure.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Internal(format!("database: {}", err))
    }
}

impl From<io::Error> for ServiceError {
    fn from(err: io::Error) -> Self {
        ServiceError::Internal(format!("blob store: {}", err))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Map a write error to `Conflict` when it came from a unique index.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::Conflict(message())
    } else {
        ServiceError::from(err)
    }
}
