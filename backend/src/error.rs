//! Error handling for the stock procurement service
//!
//! Wraps the domain taxonomy and maps every error to a consistent JSON body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::WorkflowError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Domain failure from the workflow or ledger
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    // Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Workflow(err) => match err {
                WorkflowError::Validation { .. } => StatusCode::BAD_REQUEST,
                WorkflowError::Range { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::State(_) => StatusCode::CONFLICT,
                WorkflowError::Authorization(_) => StatusCode::FORBIDDEN,
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::Workflow(err) => {
                let field = match err {
                    WorkflowError::Validation { field, .. } | WorkflowError::Range { field, .. } => {
                        Some(field.clone())
                    }
                    _ => None,
                };
                let message = match err {
                    WorkflowError::Validation { message, .. }
                    | WorkflowError::Range { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                ErrorDetail {
                    code: err.code().to_string(),
                    message,
                    field,
                }
            }
            AppError::ValidationError(msg) => ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            AppError::DatabaseError(_) => {
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred")
            }
            AppError::Internal(_) => {
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: self.detail() })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_status_mapping() {
        let cases = [
            (WorkflowError::validation("branch_id", "inactive"), StatusCode::BAD_REQUEST),
            (
                WorkflowError::range("quantity_registered", "too many"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (WorkflowError::state("terminal"), StatusCode::CONFLICT),
            (
                WorkflowError::Authorization("no".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                WorkflowError::NotFound("Purchase order".into()),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_range_detail_carries_field() {
        let detail = AppError::from(WorkflowError::range("buying_price", "must be positive")).detail();
        assert_eq!(detail.code, "RANGE_ERROR");
        assert_eq!(detail.field.as_deref(), Some("buying_price"));
        assert_eq!(detail.message, "must be positive");
    }

    #[test]
    fn test_database_error_hides_details() {
        let err = AppError::DatabaseError(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(ErrorResponse { error: err.detail() }).unwrap();
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        assert!(body["error"].get("field").is_none());
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = AppError::from(anyhow::anyhow!("unknown order status archived"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = err.detail();
        assert_eq!(detail.code, "INTERNAL_ERROR");
        assert!(!detail.message.contains("archived"));
        assert!(err.to_string().contains("archived"));
    }
}
