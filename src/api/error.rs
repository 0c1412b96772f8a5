// src/api/error.rs
// Centralised error handling for HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tracing::error;

use crate::error::ServiceError;

/// Standard API error response format
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
    pub error_code: Option<String>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            error_code: Some("INTERNAL_ERROR".to_string()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
            error_code: Some("BAD_REQUEST".to_string()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::NOT_FOUND,
            error_code: Some("NOT_FOUND".to_string()),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
            error_code: Some("SERVICE_UNAVAILABLE".to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Only genuine faults reach this conversion; business outcomes are encoded
/// in 200-OK envelopes before they ever become errors.
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::InvalidQuery(m) => ApiError::bad_request(m.clone()),
            ServiceError::ProductNotFound(id) => ApiError::not_found(format!("Product {id} not found")),
            ServiceError::RateLimited => Self {
                message: "Upstream rate limit hit; please try again".into(),
                status_code: StatusCode::TOO_MANY_REQUESTS,
                error_code: Some("RATE_LIMITED".to_string()),
            },
            ServiceError::PhraseStoreNotReady => {
                ApiError::unavailable("Recommendation engine is still warming up")
            }
            other => {
                error!("Internal error: {}", other);
                ApiError::internal("Something went wrong. Please try again.")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": true,
            "message": self.message,
            "status": self.status_code.as_u16(),
        });
        if let Some(code) = self.error_code {
            body["error_code"] = json!(code);
        }
        (self.status_code, Json(body)).into_response()
    }
}
