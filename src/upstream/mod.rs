//! The rate-limited third-party API.
//!
//! # Responsibilities
//! - Perform exactly one GET per call, with the configured bearer token
//! - Surface the quota headers and the block marker on every response
//! - Report transport failures and timeouts as typed failures
//!
//! Nothing here retries; the scheduler decides when a call may run.

pub mod client;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use std::time::Duration;
use thiserror::Error;

pub use client::HttpUpstream;

/// Why an upstream call produced no response.
#[derive(Debug, Clone, Error)]
pub enum UpstreamFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream not configured: {0}")]
    NotConfigured(String),
}

/// Quota values read from one response's rate-limit headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaReading {
    pub remaining: i64,
    pub limit: i64,
    /// Unix seconds; 0 when the upstream did not say.
    pub reset_at: i64,
}

/// A complete upstream response, body buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The upstream's explicit "you are blocked" marker was present.
    pub blocked: bool,
    pub quota: Option<QuotaReading>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Names of the headers the upstream uses for quota telemetry and blocking.
#[derive(Debug, Clone)]
pub struct SignalHeaders {
    pub blocked: String,
    pub remaining: String,
    pub limit: String,
    pub reset: String,
}

impl SignalHeaders {
    /// Remaining and limit are required; reset is optional.
    pub fn quota(&self, headers: &HeaderMap) -> Option<QuotaReading> {
        let number = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };
        Some(QuotaReading {
            remaining: number(&self.remaining)?,
            limit: number(&self.limit)?,
            reset_at: number(&self.reset).unwrap_or(0),
        })
    }

    pub fn is_blocked(&self, headers: &HeaderMap) -> bool {
        headers.contains_key(self.blocked.as_str())
    }
}

/// One upstream round trip.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// GET `path` (relative to the upstream base) with the raw query string.
    async fn fetch(&self, path: &str, query: Option<&str>) -> Result<UpstreamResponse, UpstreamFailure>;

    /// Whether credentials are present. Checked before any call is scheduled.
    fn is_configured(&self) -> bool {
        true
    }
}
