//! Control API errors.
//!
//! Every error is answered with HTTP 400 and `{"code": 100, "data": "<message>"}`
//! so scripts can branch on `code` alone.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::admin::handlers::ApiResponse;

/// Error code of a malformed or missing query parameter.
pub const API_PROXY_QUERY: i32 = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("require query {0} port")]
    MissingParameter(&'static str),

    #[error("{key} port {value:?} is invalid: {reason}")]
    InvalidPort {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::MissingParameter(_) | ApiError::InvalidPort { .. } => API_PROXY_QUERY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Control API request rejected");
        let body = ApiResponse {
            code: self.code(),
            data: self.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
