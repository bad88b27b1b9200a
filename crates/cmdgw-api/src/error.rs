//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Domain errors from the engine keep their machine-readable reason codes
//! on the way out; internal error details are never exposed to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cmdgw_engine::GatewayError;

/// Structured JSON error response body.
///
/// All error responses use this format. The `details` field carries
/// additional context for validation errors but is omitted for 500-class
/// errors to prevent information leakage.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INSUFFICIENT_CREDITS").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An engine operation failed; carries the domain reason code.
    #[error(transparent)]
    Domain(#[from] GatewayError),

    /// Internal server error (500). Message is logged but not returned to
    /// the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Domain(err) => (domain_status(err), err.reason_code()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// Map engine errors to HTTP status codes: missing resources are 404,
/// state and balance conflicts are 409, bad input is 422.
fn domain_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UserNotFound(_)
        | GatewayError::CommandNotFound(_)
        | GatewayError::RuleNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::NotPendingApproval { .. } | GatewayError::InsufficientCredits { .. } => {
            StatusCode::CONFLICT
        }
        GatewayError::EmptyReason | GatewayError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdgw_core::{CommandId, UserId};
    use cmdgw_engine::CommandStatus;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn domain_not_found_maps_to_404() {
        let err = AppError::from(GatewayError::UserNotFound(UserId::new()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn insufficient_credits_is_conflict_with_code() {
        let err = AppError::from(GatewayError::InsufficientCredits {
            required: 5,
            available: 1,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INSUFFICIENT_CREDITS");
    }

    #[tokio::test]
    async fn not_pending_approval_is_conflict() {
        let err = AppError::from(GatewayError::NotPendingApproval {
            command_id: CommandId::new(),
            status: CommandStatus::Executed,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_PENDING_APPROVAL");
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let err = AppError::Internal("database password is hunter2".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn invalid_pattern_is_unprocessable() {
        let err = AppError::from(GatewayError::Validation(
            cmdgw_core::ValidationError::InvalidPattern {
                pattern: "[".into(),
                reason: "unclosed".into(),
            },
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INVALID_PATTERN");
    }
}
