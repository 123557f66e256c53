//! Typed access to the shared circuit state.
//!
//! # Keys
//! - `circuit:hard_lock`, `circuit:soft_lock`: TTL-bearing flags; absent means inactive
//! - `rate:quota`: last quota snapshot as one JSON document
//! - `platform:audit`: bounded list of audit entries, newest first
//! - `platform:shield_settings`: live circuit tunables
//!
//! Pure storage; the circuit breaker owns the policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::resilience::settings::ShieldSettings;
use crate::store::{KeyTtl, KvStore, StoreError, StoreResult};

const HARD_LOCK_KEY: &str = "circuit:hard_lock";
const SOFT_LOCK_KEY: &str = "circuit:soft_lock";
const QUOTA_KEY: &str = "rate:quota";
const AUDIT_KEY: &str = "platform:audit";
const SETTINGS_KEY: &str = "platform:shield_settings";

/// The two independent circuit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Total halt.
    Hard,
    /// Cooldown.
    Soft,
}

impl LockKind {
    fn key(self) -> &'static str {
        match self {
            LockKind::Hard => HARD_LOCK_KEY,
            LockKind::Soft => SOFT_LOCK_KEY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockKind::Hard => "hard",
            LockKind::Soft => "soft",
        }
    }
}

/// Last quota values reported by upstream response headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub remaining: i64,
    pub limit: i64,
    /// Unix seconds at which the upstream window resets.
    pub reset_at: i64,
    pub observed_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    pub fn new(remaining: i64, limit: i64, reset_at: i64) -> Self {
        Self {
            remaining,
            limit,
            reset_at,
            observed_at: Utc::now(),
        }
    }

    /// Share of the window already used, 0–100.
    pub fn percent_used(&self) -> f64 {
        if self.limit <= 0 {
            return 0.0;
        }
        let used = (self.limit - self.remaining.max(0)) as f64;
        (used / self.limit as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Exhausted, or under `fraction` of the limit.
    pub fn is_low(&self, fraction: f64) -> bool {
        if self.remaining <= 0 {
            return true;
        }
        self.limit > 0 && (self.remaining as f64) < self.limit as f64 * fraction
    }
}

/// One entry of the append-only admin audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            payload,
        }
    }
}

/// Typed access layer over the shared `KvStore`.
#[derive(Clone)]
pub struct QuotaStore {
    kv: Arc<dyn KvStore>,
    audit_len: usize,
}

impl QuotaStore {
    pub fn new(kv: Arc<dyn KvStore>, audit_len: usize) -> Self {
        Self { kv, audit_len }
    }

    /// Remaining lifetime of a lock, `None` if inactive.
    ///
    /// A lock stored without an expiry reports `Duration::MAX`; callers
    /// substitute their configured TTL for the retry hint.
    pub async fn lock_remaining(&self, kind: LockKind) -> StoreResult<Option<Duration>> {
        Ok(match self.kv.ttl(kind.key()).await? {
            KeyTtl::Missing => None,
            KeyTtl::Persistent => Some(Duration::MAX),
            KeyTtl::Expires(remaining) if remaining.is_zero() => None,
            KeyTtl::Expires(remaining) => Some(remaining),
        })
    }

    /// Set a lock unless one is already active. Returns whether it was set.
    pub async fn acquire_lock(&self, kind: LockKind, ttl: Duration) -> StoreResult<bool> {
        self.kv.set_nx_ex(kind.key(), b"1", ttl).await
    }

    /// Remove both flags together with the quota snapshot that could re-trip them.
    pub async fn clear_locks(&self) -> StoreResult<()> {
        self.kv.del(&[HARD_LOCK_KEY, SOFT_LOCK_KEY, QUOTA_KEY]).await
    }

    pub async fn read_quota(&self) -> StoreResult<Option<QuotaSnapshot>> {
        self.read_json(QUOTA_KEY).await
    }

    pub async fn write_quota(&self, snapshot: &QuotaSnapshot) -> StoreResult<()> {
        self.write_json(QUOTA_KEY, snapshot).await
    }

    pub async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let bytes = encode(AUDIT_KEY, entry)?;
        self.kv.push_bounded(AUDIT_KEY, &bytes, self.audit_len).await
    }

    /// Most recent entries first. Undecodable entries are skipped.
    pub async fn read_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let raw = self.kv.range(AUDIT_KEY, limit.min(self.audit_len)).await?;
        Ok(raw
            .iter()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect())
    }

    pub async fn read_settings(&self) -> StoreResult<Option<ShieldSettings>> {
        self.read_json(SETTINGS_KEY).await
    }

    pub async fn write_settings(&self, settings: &ShieldSettings) -> StoreResult<()> {
        self.write_json(SETTINGS_KEY, settings).await
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.kv.ping().await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.kv.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = encode(key, value)?;
        self.kv.set(key, &bytes).await
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
