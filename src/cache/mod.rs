//! Read-through response cache.
//!
//! # Data Flow
//! ```text
//! gateway → get(key) → hit: serve cached body
//!                    → miss: schedule upstream call
//!                              → 2xx, not blocked: set(key, body, ttl)
//! ```
//!
//! # Design Decisions
//! - Populated only after a verified-successful call, never in the background
//! - Entries expire by TTL; there is no invalidation primitive
//! - A store outage degrades to "always miss", never to a gateway failure

pub mod key;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

use crate::config::CacheConfig;
use crate::observability::events::{self, CacheOp};
use crate::store::KvStore;

pub use key::CacheKey;

#[derive(Clone)]
pub struct ResponseCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(kv: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self {
            kv,
            ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
        }
    }

    /// Fixed lifetime applied to fresh entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }
        match self.kv.get(key.as_str()).await {
            Ok(Some(body)) => {
                events::cache(CacheOp::Hit, key);
                Some(Bytes::from(body))
            }
            Ok(None) => {
                events::cache(CacheOp::Miss, key);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                events::cache(CacheOp::Miss, key);
                None
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, body: &[u8], ttl: Duration) {
        if !self.enabled {
            return;
        }
        match self.kv.set_ex(key.as_str(), body, ttl).await {
            Ok(()) => events::cache(CacheOp::Set, key),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache write failed"),
        }
    }
}
