//! JSON error responses for the web adapter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::BalancerError;

/// Rendered as `{"ok": false, "error": message}`.
#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &BalancerError) -> StatusCode {
    match err {
        BalancerError::InvalidInput { .. } | BalancerError::Decode { .. } => {
            StatusCode::BAD_REQUEST
        }
        BalancerError::NotFound { .. } => StatusCode::NOT_FOUND,
        BalancerError::Http { .. } | BalancerError::HttpStatus { .. } => StatusCode::BAD_GATEWAY,
        BalancerError::Database { .. }
        | BalancerError::DatabaseQuery { .. }
        | BalancerError::ConfigParse { .. }
        | BalancerError::ConfigMissing { .. }
        | BalancerError::ConfigInvalid { .. }
        | BalancerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BalancerError> for WebError {
    fn from(err: BalancerError) -> Self {
        Self::new(status_from_error(&err), err.code())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "ok": false, "error": self.message })),
        )
            .into_response()
    }
}
