//! Error types for atr-submit HTTP handlers
//!
//! Every failure becomes `{ "error": { "code", "message" } }` with a status
//! chosen by error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{PublishError, SubmitError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be decoded (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Body over the route's size limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Pipeline failure, status depends on kind
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Submit(SubmitError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Submit(SubmitError::ImageUploadFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Submit(SubmitError::Publish(PublishError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Submit(SubmitError::Publish(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Submit(SubmitError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Submit(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Submit(e) => e.detail(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use atr_common::ValidationError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::from(SubmitError::from(ValidationError::MissingTargets)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(SubmitError::from(PublishError::Timeout(Duration::from_secs(10)))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::from(SubmitError::from(PublishError::ConnectFailed("x".into()))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(SubmitError::Internal("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).code(), "BAD_REQUEST");
        let missing = ApiError::from(SubmitError::from(ValidationError::MissingField {
            index: 2,
            field: "roll",
        }));
        assert_eq!(missing.code(), "MISSING_FIELD");
        assert_eq!(missing.to_string(), "Target 2 missing required field: roll");
    }
}
