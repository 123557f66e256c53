//! Read-only gateway to the upstream API.
//!
//! # Request path
//! ```text
//! method check ─ not GET/HEAD ──────────────────────────→ 403 METHOD_NOT_ALLOWED
//!   → authorize ─ no access ────────────────────────────→ 401 UNAUTHORIZED
//!   → breaker.admit ─ hard lock ────────────────────────→ 503 SYSTEM_HALTED
//!                   ─ soft lock / quota exhausted ──────→ 429 RATE_LIMITED
//!   → cache ─ hit ──────────────────────────────────────→ 200, X-Cache: HIT
//!   → scheduler → upstream
//!       ─ block marker → trip hard lock ────────────────→ 503 SYSTEM_HALTED
//!       ─ 429 → trip soft lock ─────────────────────────→ 429 RATE_LIMITED
//!       ─ other non-2xx ────────────────────────────────→ mirrored status, API_ERROR
//!       ─ 2xx → cache.set ──────────────────────────────→ 200, X-Cache: MISS
//! ```
//!
//! The method check runs before anything else so a write never touches
//! the store, the cache or the scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::UpstreamConfig;
use crate::error::{retry_hint, ShieldError};
use crate::http::server::AppState;
use crate::observability::{events, metrics};
use crate::resilience::{CircuitBreaker, RequestScheduler};
use crate::security::Authorizer;
use crate::store::StoreError;
use crate::upstream::Upstream;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Longest upstream error body echoed back in `details`.
const MAX_DETAIL_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A successful gateway answer.
#[derive(Debug)]
pub struct GatewayReply {
    pub body: Bytes,
    pub cache: CacheStatus,
    /// Quota headers forwarded from a fresh upstream response.
    pub headers: HeaderMap,
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        let headers = response.headers_mut();
        headers.extend(self.headers);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(X_CACHE, HeaderValue::from_static(self.cache.as_str()));
        response
    }
}

pub struct Gateway {
    breaker: Arc<CircuitBreaker>,
    scheduler: Arc<RequestScheduler>,
    cache: ResponseCache,
    upstream: Arc<dyn Upstream>,
    authorizer: Arc<dyn Authorizer>,
    forwarded: Vec<HeaderName>,
}

impl Gateway {
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        scheduler: Arc<RequestScheduler>,
        cache: ResponseCache,
        upstream: Arc<dyn Upstream>,
        authorizer: Arc<dyn Authorizer>,
        config: &UpstreamConfig,
    ) -> Self {
        let forwarded = [&config.remaining_header, &config.limit_header]
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
            .collect();
        Self {
            breaker,
            scheduler,
            cache,
            upstream,
            authorizer,
            forwarded,
        }
    }

    /// Serve one request for `path` (relative to the upstream base).
    pub async fn handle(
        &self,
        method: &Method,
        headers: &HeaderMap,
        path: &str,
        query: Option<&str>,
    ) -> Result<GatewayReply, ShieldError> {
        if !is_retrieval(method) {
            return Err(ShieldError::MethodNotAllowed(method.clone()));
        }

        if !self.authorizer.authorize(headers).await.may_invoke {
            return Err(ShieldError::Unauthorized);
        }

        self.breaker.admit().await?;

        if !self.upstream.is_configured() {
            return Err(ShieldError::Configuration("upstream API token not configured".to_string()));
        }

        let key = CacheKey::new(path, query);
        if let Some(body) = self.cache.get(&key).await {
            return Ok(GatewayReply {
                body,
                cache: CacheStatus::Hit,
                headers: HeaderMap::new(),
            });
        }

        let upstream = self.upstream.clone();
        let call_path = path.to_string();
        let call_query = query.map(str::to_string);
        let response = self
            .scheduler
            .schedule(move || async move { upstream.fetch(&call_path, call_query.as_deref()).await })
            .await?;

        // The dispatch task has already persisted these trips. Tripping again
        // is a no-op that reports the remaining TTL, and retries a failed write.
        if response.blocked {
            let ttl = self.breaker.settings().hard_ttl();
            let active = self.trip(self.breaker.trip_hard_lock(ttl, "upstream block marker").await, ttl);
            return Err(ShieldError::UpstreamBlocked {
                retry_after: retry_hint(active),
            });
        }

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let ttl = self.breaker.settings().soft_ttl();
            let active = self.trip(self.breaker.trip_soft_lock(ttl, "upstream returned 429").await, ttl);
            return Err(ShieldError::Cooldown {
                retry_after: retry_hint(active),
            });
        }

        if !response.is_success() {
            return Err(ShieldError::Upstream {
                status: response.status,
                detail: String::from_utf8_lossy(&response.body).chars().take(MAX_DETAIL_CHARS).collect(),
            });
        }

        self.cache.set(&key, &response.body, self.cache.ttl()).await;

        let mut forwarded = HeaderMap::new();
        for name in &self.forwarded {
            if let Some(value) = response.headers.get(name) {
                forwarded.insert(name.clone(), value.clone());
            }
        }

        Ok(GatewayReply {
            body: response.body,
            cache: CacheStatus::Miss,
            headers: forwarded,
        })
    }

    /// A trip that fails to persist still rejects this request for the full TTL.
    fn trip(&self, result: Result<Duration, StoreError>, ttl: Duration) -> Duration {
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to persist circuit trip");
            ttl
        })
    }
}

fn is_retrieval(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Axum handler for `{route_prefix}/{*path}`.
pub async fn gateway_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let path = uri
        .path()
        .strip_prefix(state.config.listener.route_prefix.as_str())
        .unwrap_or(uri.path());

    let result = state.gateway.handle(&method, &headers, path, uri.query()).await;

    let (response, cache, error) = match result {
        Ok(reply) => {
            let cache = reply.cache;
            (reply.into_response(), Some(cache), None)
        }
        Err(e) => {
            let code = e.code();
            (e.into_response(), None, Some(code))
        }
    };

    let status = response.status().as_u16();
    events::proxy_request(
        method.as_str(),
        path,
        status,
        start.elapsed(),
        cache == Some(CacheStatus::Hit),
        error,
    );
    metrics::record_request(
        method.as_str(),
        status,
        cache.map_or("none", |c| if c == CacheStatus::Hit { "hit" } else { "miss" }),
        start,
    );

    response
}
