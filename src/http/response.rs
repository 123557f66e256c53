//! Response mapping.
//!
//! # Responsibilities
//! - Turn every `ShieldError` into a status code and a JSON body
//! - Attach `Retry-After` whenever the rejection carries a retry hint
//!
//! # Body shape
//! ```text
//! { "error": "SYSTEM_HALTED", "message": "...", "retryAfter": 287, "details": "..." }
//! ```
//! `retryAfter` and `details` are omitted when not applicable.

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ShieldError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&ShieldError> for ErrorBody {
    fn from(err: &ShieldError) -> Self {
        let details = match err {
            ShieldError::Upstream { detail, .. } if !detail.is_empty() => Some(detail.clone()),
            _ => None,
        };
        Self {
            error: err.code(),
            message: err.to_string(),
            retry_after: err.retry_after(),
            details,
        }
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
