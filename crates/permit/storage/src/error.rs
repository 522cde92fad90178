use permit_types::PermitError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for PermitError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => PermitError::Conflict(msg),
            other => PermitError::Storage(other.to_string()),
        }
    }
}
