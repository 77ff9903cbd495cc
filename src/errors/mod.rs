//! Error handling module for the EventDesk backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const NOT_ELIGIBLE: &str = "NOT_ELIGIBLE";
    pub const CONFIRMATION_REQUIRED: &str = "CONFIRMATION_REQUIRED";
    pub const UNDO_EXPIRED: &str = "UNDO_EXPIRED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Why an attendee cannot be checked in right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    /// No session selected for a session-centric event
    NoSession,
    /// Already checked in
    AlreadyCheckedIn,
    /// Booking or payment status does not qualify
    Payment(String),
    /// Session started long ago; operator must confirm
    LateSession { hours_late: i64 },
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibleReason::NoSession => "session",
            IneligibleReason::AlreadyCheckedIn => "status",
            IneligibleReason::Payment(_) => "payment",
            IneligibleReason::LateSession { .. } => "late",
        }
    }

    pub fn message(&self) -> String {
        match self {
            IneligibleReason::NoSession => "Select a session before checking in".to_string(),
            IneligibleReason::AlreadyCheckedIn => "Attendee is already checked in".to_string(),
            IneligibleReason::Payment(status) => {
                format!("Booking status '{}' does not allow check-in", status)
            }
            IneligibleReason::LateSession { hours_late } => format!(
                "Session started {} hours ago; confirm to check in anyway",
                hours_late
            ),
        }
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Caller lacks the capability for this action
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Validation error
    Validation(String),
    /// Check-in guard rejected the attendee
    Ineligible(IneligibleReason),
    /// Undo requested after the window closed or for a superseded check-in
    UndoExpired(String),
    /// Database error
    Database(String),
    /// Remote service failed or is unreachable
    Upstream(String),
    /// Internal server error
    Internal(String),
    /// Bad request
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Ineligible(IneligibleReason::LateSession { .. }) => StatusCode::CONFLICT,
            AppError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UndoExpired(_) => StatusCode::GONE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Ineligible(IneligibleReason::LateSession { .. }) => {
                codes::CONFIRMATION_REQUIRED
            }
            AppError::Ineligible(_) => codes::NOT_ELIGIBLE,
            AppError::UndoExpired(_) => codes::UNDO_EXPIRED,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Upstream(_) => codes::UPSTREAM_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Ineligible(reason) => reason.message(),
            AppError::UndoExpired(msg) => msg.clone(),
            AppError::Database(msg) => msg.clone(),
            AppError::Upstream(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
        }
    }

    /// Machine-readable extras for the error envelope.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Ineligible(IneligibleReason::LateSession { hours_late }) => Some(
                serde_json::json!({ "reason": "late", "hoursLate": hours_late }),
            ),
            AppError::Ineligible(reason) => Some(serde_json::json!({ "reason": reason.as_str() })),
            AppError::Forbidden(_) => Some(serde_json::json!({ "reason": "permission" })),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("Upstream request failed: {:?}", err);
        AppError::Upstream(format!("Upstream request failed: {}", err))
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        tracing::error!("CSV error: {:?}", err);
        AppError::Internal(format!("CSV error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision_id: i64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision_id: i64) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details: error.details(),
            },
            revision_id,
        }
    }
}

/// Wrapper type for errors that carry revision_id context.
#[derive(Debug)]
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision_id: i64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision_id);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_checked_in_maps_to_status_reason() {
        let err = AppError::Ineligible(IneligibleReason::AlreadyCheckedIn);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), codes::NOT_ELIGIBLE);
        assert_eq!(err.details().unwrap()["reason"], "status");
    }

    #[test]
    fn test_late_session_needs_confirmation() {
        let err = AppError::Ineligible(IneligibleReason::LateSession { hours_late: 5 });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), codes::CONFIRMATION_REQUIRED);
        assert_eq!(err.details().unwrap()["hoursLate"], 5);
    }

    #[test]
    fn test_envelope_omits_empty_details() {
        let body = ErrorResponse::new(&AppError::NotFound("gone".to_string()), 7);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["revisionId"], 7);
        assert!(json["error"].get("details").is_none());
    }
}
