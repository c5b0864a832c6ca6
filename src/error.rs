//! HTTP-facing error type.
//!
//! Every handler failure renders as `{"error": "<message>"}` with a mapped status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The caller sent something unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The request body exceeds the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The upstream answered with a non-success status; relayed as-is.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// The upstream could not be reached or answered garbage.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream { status, .. } => *status,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
