//! Gateway error taxonomy.
//!
//! Every rejection the gateway can produce. Variants carrying `retry_after`
//! are returned to the caller with a retry hint in seconds; none of them are
//! retried inside the shield.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::upstream::UpstreamFailure;

#[derive(Debug, Error)]
pub enum ShieldError {
    /// Hard lock active: system-wide halt.
    #[error("system halted, retry after {retry_after}s")]
    Halted { retry_after: u64 },

    /// Soft lock active: transient cooldown.
    #[error("cooling down, retry after {retry_after}s")]
    Cooldown { retry_after: u64 },

    /// Read-only policy violation.
    #[error("method {0} is not permitted, the gateway is read-only")]
    MethodNotAllowed(Method),

    #[error("caller is not authorized to use the gateway")]
    Unauthorized,

    /// The upstream explicitly signalled that it blocked us. The hard lock has been tripped.
    #[error("upstream blocked access, system halted for {retry_after}s")]
    UpstreamBlocked { retry_after: u64 },

    /// Ordinary non-success response from the upstream.
    #[error("upstream returned {status}")]
    Upstream { status: StatusCode, detail: String },

    #[error("upstream unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    /// Too many calls already waiting for a scheduler slot.
    #[error("upstream call queue is full")]
    QueueFull { retry_after: u64 },

    /// Waited longer than the scheduler allows for a slot.
    #[error("no upstream slot became free in time")]
    QueueTimeout { retry_after: u64 },

    /// The whole request outlived the listener's deadline.
    #[error("request did not complete in time")]
    RequestTimeout { retry_after: u64 },

    /// The shared quota store could not be reached.
    #[error("shared store unavailable: {reason}")]
    StoreUnavailable { reason: String, retry_after: u64 },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rejected admin input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ShieldError {
    /// Machine-readable code placed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ShieldError::Halted { .. } | ShieldError::UpstreamBlocked { .. } => "SYSTEM_HALTED",
            ShieldError::Cooldown { .. } => "RATE_LIMITED",
            ShieldError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ShieldError::Unauthorized => "UNAUTHORIZED",
            ShieldError::Upstream { .. } => "API_ERROR",
            ShieldError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ShieldError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            ShieldError::QueueFull { .. } => "QUEUE_FULL",
            ShieldError::QueueTimeout { .. } => "QUEUE_TIMEOUT",
            ShieldError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            ShieldError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            ShieldError::Configuration(_) => "CONFIGURATION_ERROR",
            ShieldError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ShieldError::Halted { .. }
            | ShieldError::UpstreamBlocked { .. }
            | ShieldError::QueueFull { .. }
            | ShieldError::QueueTimeout { .. }
            | ShieldError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ShieldError::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ShieldError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            ShieldError::MethodNotAllowed(_) => StatusCode::FORBIDDEN,
            ShieldError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShieldError::Upstream { status, .. } => *status,
            ShieldError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ShieldError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ShieldError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShieldError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Seconds the caller should wait before trying again.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ShieldError::Halted { retry_after }
            | ShieldError::Cooldown { retry_after }
            | ShieldError::UpstreamBlocked { retry_after }
            | ShieldError::QueueFull { retry_after }
            | ShieldError::QueueTimeout { retry_after }
            | ShieldError::RequestTimeout { retry_after }
            | ShieldError::StoreUnavailable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<UpstreamFailure> for ShieldError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Timeout(limit) => ShieldError::UpstreamTimeout(limit),
            UpstreamFailure::Transport(reason) => ShieldError::UpstreamUnavailable(reason),
            UpstreamFailure::NotConfigured(reason) => ShieldError::Configuration(reason),
        }
    }
}

/// Round a remaining lifetime up to whole seconds, never below one.
pub fn retry_hint(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_hint_rounds_up() {
        assert_eq!(retry_hint(Duration::from_secs(60)), 60);
        assert_eq!(retry_hint(Duration::from_millis(59_990)), 60);
        assert_eq!(retry_hint(Duration::from_millis(10)), 1);
        assert_eq!(retry_hint(Duration::ZERO), 1);
    }

    #[test]
    fn test_blocked_reports_as_halted() {
        let err = ShieldError::UpstreamBlocked { retry_after: 300 };
        assert_eq!(err.code(), "SYSTEM_HALTED");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.retry_after(), Some(300));
    }

    #[test]
    fn test_upstream_status_is_mirrored() {
        let err = ShieldError::Upstream {
            status: StatusCode::NOT_FOUND,
            detail: "missing".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.retry_after(), None);
    }
}
