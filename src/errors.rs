use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error payload returned on every failure path. Callers get a
/// machine-checkable outcome, never a bare exception.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Field-level validation detail, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The vision endpoint could not be reached after bounded retries.
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// The model answered but no structured document could be parsed out.
    /// Never treated as an empty invoice.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExtractionUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal errors return generic messages to avoid leaking implementation
    /// details; user-facing errors keep the real message.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::StorageError(_) => "Storage error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message: self.response_message(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_outcomes_map_to_distinct_statuses() {
        let unavailable = ServiceError::ExtractionUnavailable("timeout".into());
        let failed = ServiceError::ExtractionFailed("no JSON in response".into());
        assert_eq!(unavailable.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(failed.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_ne!(unavailable.status_code(), failed.status_code());
    }

    #[test]
    fn state_conflicts_are_409() {
        let err = ServiceError::Conflict("invoice already delivered".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.response_message().contains("already delivered"));
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ServiceError::InternalError("connection pool exhausted".into());
        assert_eq!(err.response_message(), "Internal server error");
    }
}
