//! Error types for permit and work-order operations

use crate::{PermitId, PermitStatus, WorkOrderId, WorkOrderStatus};

/// Error taxonomy surfaced to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    /// Readiness refusal or illegal state transition
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Authorization => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Authorization => "FORBIDDEN",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Errors that can occur in permit and work-order operations
#[derive(Debug, thiserror::Error)]
pub enum PermitError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permit not found: {0}")]
    PermitNotFound(PermitId),

    #[error("Work order not found: {0}")]
    WorkOrderNotFound(WorkOrderId),

    #[error("One or more linked permits could not be found ({resolved} of {requested} resolved)")]
    LinkedPermitsMissing { requested: usize, resolved: usize },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Permit has no pending approvals")]
    NoPendingApprovals,

    #[error("Permit is {0} and can no longer be changed")]
    PermitFinalized(PermitStatus),

    #[error("Permits not ready: {0}")]
    NotReady(String),

    #[error("Invalid transition from {from}: {reason}")]
    InvalidTransition {
        from: WorkOrderStatus,
        reason: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PermitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PermitError::Validation(_)
            | PermitError::NoPendingApprovals
            | PermitError::PermitFinalized(_) => ErrorKind::Validation,
            PermitError::PermitNotFound(_)
            | PermitError::WorkOrderNotFound(_)
            | PermitError::LinkedPermitsMissing { .. } => ErrorKind::NotFound,
            PermitError::Unauthorized(_) => ErrorKind::Authorization,
            PermitError::NotReady(_)
            | PermitError::InvalidTransition { .. }
            | PermitError::Conflict(_) => ErrorKind::Conflict,
            PermitError::Configuration(_) | PermitError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to show to the caller; internal details stay in the logs
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for permit operations
pub type PermitResult<T> = Result<T, PermitError>;
