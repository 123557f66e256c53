//! Shared key-value store.
//!
//! # Data Flow
//! ```text
//! circuit breaker / response cache / admin
//!     → quota.rs (typed keys: locks, quota snapshot, audit, settings)
//!     → KvStore (single-key operations with TTLs)
//!     → memory.rs (one process) or redis.rs (shared across processes)
//! ```
//!
//! # Design Decisions
//! - Only single-key operations; no multi-key transactions, no distributed locks
//! - Every lock is written with a TTL so an abandoned lock always ages out
//! - Backends report failures as `StoreError`; callers choose fail-open or fail-closed

pub mod memory;
pub mod quota;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use memory::MemoryStore;
pub use quota::{AuditEntry, LockKind, QuotaSnapshot, QuotaStore};
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The key holds a value of a different kind (e.g. a list where a string was expected).
    #[error("wrong value type at '{0}'")]
    WrongType(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    /// Exists without an expiry.
    Persistent,
    Expires(Duration),
}

/// Single-key storage primitives shared by every process instance.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Write only if the key is absent. Returns whether the write happened.
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    async fn del(&self, keys: &[&str]) -> StoreResult<()>;

    /// Prepend to a list and trim it to `max_len` entries.
    async fn push_bounded(&self, key: &str, value: &[u8], max_len: usize) -> StoreResult<()>;

    /// Up to `count` list entries, most recently pushed first.
    async fn range(&self, key: &str, count: usize) -> StoreResult<Vec<Vec<u8>>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Build the configured backend.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn KvStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-process memory store; circuit state is not shared between instances");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("redis_url not configured".to_string()))?;
            let store = RedisStore::connect(url, config.key_prefix.clone()).await?;
            Ok(Arc::new(store))
        }
    }
}
