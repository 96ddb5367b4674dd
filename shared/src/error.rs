//! Domain error taxonomy for the purchasing workflow and stock ledger

use thiserror::Error;

/// Typed failure returned by every workflow and ledger operation.
///
/// Operations validate fully before mutating, so receiving one of these
/// guarantees the aggregate was left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Missing, inactive or malformed reference
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// Quantity or price outside its allowed bound
    #[error("Out of range on {field}: {message}")]
    Range { field: String, message: String },

    /// Operation not legal for the current status or stage
    #[error("Illegal state: {0}")]
    State(String),

    /// Missing or ineligible actor
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Order or item absent or inactive
    #[error("{0} not found")]
    NotFound(String),
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn range(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Range {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        WorkflowError::State(message.into())
    }

    /// Stable machine-readable code, used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "VALIDATION_ERROR",
            WorkflowError::Range { .. } => "RANGE_ERROR",
            WorkflowError::State(_) => "STATE_ERROR",
            WorkflowError::Authorization(_) => "AUTHORIZATION_ERROR",
            WorkflowError::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// Result alias for domain operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
