//! Error types for qcflow-server
//!
//! Every handler returns [`ApiResult`]. Service errors convert into
//! [`ApiError`] so handlers can use `?` throughout; the JSON body is always
//! `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qcflow_common::validation::ValidationError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::services::feedback::FeedbackError;
use crate::services::prediction_client::PredictionError;
use crate::services::retraining::RetrainingError;
use crate::services::root_cause::WorkflowError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing, expired or unknown session (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session lacks the route's permission (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409), e.g. data already submitted for the batch
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream prediction or training service failed (502)
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// qcflow-common error
    #[error("Common error: {0}")]
    Common(#[from] qcflow_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => {
                warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg)
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Common(err) => match err {
                qcflow_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                qcflow_common::Error::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
                }
                qcflow_common::Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                other => {
                    error!("Common error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "COMMON_ERROR",
                        other.to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Prediction(e) => e.into(),
            WorkflowError::Common(e) => e.into(),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::NoPrediction(_) | FeedbackError::NotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            FeedbackError::Validation(e) => e.into(),
            FeedbackError::Common(e) => e.into(),
        }
    }
}

impl From<RetrainingError> for ApiError {
    fn from(err: RetrainingError) -> Self {
        match err {
            RetrainingError::BelowThreshold { .. } => ApiError::Conflict(err.to_string()),
            RetrainingError::QueueClosed => ApiError::Internal(err.to_string()),
            RetrainingError::Common(e) => e.into(),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::BadGateway("x".into()), StatusCode::BAD_GATEWAY),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Common(qcflow_common::Error::Conflict("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Common(qcflow_common::Error::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ValidationError::Missing("batchNumber".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_below_threshold_is_conflict() {
        let err = ApiError::from(RetrainingError::BelowThreshold {
            count: 9,
            threshold: 10,
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
