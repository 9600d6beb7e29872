//! API error types and response formatting.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body could not be decoded.
    #[error("unprocessable request: {0}")]
    Unprocessable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Failure inside the ingestion core.
    #[error("ingest error: {0}")]
    Ingest(#[from] chronicle_ingest::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable_entity",
                Some(msg.clone()),
            ),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                )
            }
            Self::Ingest(err) => {
                tracing::error!(error = %err, "ingest error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ingest_error",
                    Some(err.to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Unprocessable("eof".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ApiError::Ingest(chronicle_ingest::Error::QueueClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
