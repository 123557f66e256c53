//! Named operational events.
//!
//! Each function emits one structured log line and updates the matching
//! metric, so call sites never repeat field names or levels.

use std::time::Duration;

use crate::cache::CacheKey;
use crate::observability::metrics;
use crate::store::{LockKind, QuotaSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Hit,
    Miss,
    Set,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Hit => "hit",
            CacheOp::Miss => "miss",
            CacheOp::Set => "set",
        }
    }
}

pub fn cache(op: CacheOp, key: &CacheKey) {
    tracing::debug!(event = "cache", op = op.as_str(), key = %key, "Cache {}", op.as_str());
    metrics::record_cache(op.as_str());
}

pub fn circuit_trip(kind: LockKind, ttl: Duration, reason: &str) {
    match kind {
        LockKind::Hard => tracing::error!(
            event = "circuit_trip",
            lock = kind.as_str(),
            ttl_secs = ttl.as_secs(),
            reason = %reason,
            "Hard lock engaged, all upstream traffic halted"
        ),
        LockKind::Soft => tracing::warn!(
            event = "circuit_trip",
            lock = kind.as_str(),
            ttl_secs = ttl.as_secs(),
            reason = %reason,
            "Soft lock engaged, cooling down"
        ),
    }
    metrics::record_circuit_trip(kind.as_str());
}

pub fn locks_cleared(actor: &str) {
    tracing::warn!(event = "locks_cleared", actor = %actor, "Circuit locks cleared manually");
}

pub fn quota(snapshot: &QuotaSnapshot) {
    let used = snapshot.percent_used();
    if used >= 90.0 {
        tracing::warn!(
            event = "quota",
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            percent_used = used,
            "Upstream quota nearly exhausted"
        );
    } else if used >= 75.0 {
        tracing::warn!(
            event = "quota",
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            percent_used = used,
            "Upstream quota running low"
        );
    } else {
        tracing::info!(
            event = "quota",
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            percent_used = used,
            "Upstream quota observed"
        );
    }
    metrics::record_quota(snapshot.remaining, snapshot.limit);
}

pub fn proxy_request(method: &str, path: &str, status: u16, duration: Duration, cached: bool, error: Option<&str>) {
    match error {
        Some(code) => tracing::warn!(
            event = "proxy_request",
            method = %method,
            path = %path,
            status,
            duration_ms = duration.as_millis() as u64,
            cached,
            error = %code,
            "Proxy request rejected"
        ),
        None => tracing::info!(
            event = "proxy_request",
            method = %method,
            path = %path,
            status,
            duration_ms = duration.as_millis() as u64,
            cached,
            "Proxy request served"
        ),
    }
}
