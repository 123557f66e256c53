//! Circuit breaker guarding the upstream API.
//!
//! # States
//! Two independent TTL-bearing flags in the shared store:
//! - Hard lock: total halt, tripped when the upstream signals a block
//! - Soft lock: cooldown, tripped on low quota or a 429 from the upstream
//! - Neither: calls may proceed
//!
//! # Admission Order
//! ```text
//! hard lock? → Halted
//! soft lock? → Cooldown
//! quota snapshot below low-water mark? → trip soft lock → Cooldown
//! otherwise → admitted
//! ```
//!
//! # Design Decisions
//! - Shared across instances (state lives in the store, not in memory)
//! - First trip wins: tripping an active lock never extends it
//! - Lock reads fail closed: an unreachable store rejects the call
//! - Quota snapshot reads fail open: the snapshot is advisory

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{retry_hint, ShieldError};
use crate::observability::events;
use crate::resilience::settings::{LiveSettings, ShieldSettings};
use crate::store::{AuditEntry, LockKind, QuotaSnapshot, QuotaStore, StoreError};

/// Snapshot of one lock for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub active: bool,
    pub retry_after: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LockStatus {
    fn from_remaining(remaining: Option<Duration>, fallback: Duration) -> Self {
        match remaining {
            Some(remaining) => {
                let remaining = bounded(remaining, fallback);
                Self {
                    active: true,
                    retry_after: Some(retry_hint(remaining)),
                    expires_at: chrono::Duration::from_std(remaining).ok().map(|d| Utc::now() + d),
                }
            }
            None => Self {
                active: false,
                retry_after: None,
                expires_at: None,
            },
        }
    }
}

/// Both flags together.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitState {
    pub hard_lock: LockStatus,
    pub soft_lock: LockStatus,
}

/// Policy layer over the quota store.
pub struct CircuitBreaker {
    store: QuotaStore,
    settings: Arc<LiveSettings>,
    store_retry: Duration,
}

impl CircuitBreaker {
    pub fn new(store: QuotaStore, settings: Arc<LiveSettings>, store_retry: Duration) -> Self {
        Self {
            store,
            settings,
            store_retry,
        }
    }

    pub fn settings(&self) -> ShieldSettings {
        self.settings.get()
    }

    /// Decide whether a new upstream call may start.
    pub async fn admit(&self) -> Result<(), ShieldError> {
        let settings = self.settings.get();

        if let Some(remaining) = self.read_lock(LockKind::Hard).await? {
            return Err(ShieldError::Halted {
                retry_after: retry_hint(bounded(remaining, settings.hard_ttl())),
            });
        }

        if let Some(remaining) = self.read_lock(LockKind::Soft).await? {
            return Err(ShieldError::Cooldown {
                retry_after: retry_hint(bounded(remaining, settings.soft_ttl())),
            });
        }

        let snapshot = match self.store.read_quota().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Quota snapshot unreadable, admitting without it");
                None
            }
        };
        if let Some(snapshot) = snapshot {
            if is_current(&snapshot, settings.soft_ttl()) && snapshot.is_low(settings.low_water_fraction) {
                let remaining = self
                    .trip_soft_lock(settings.soft_ttl(), "quota exhausted")
                    .await
                    .map_err(|e| self.unavailable(e))?;
                return Err(ShieldError::Cooldown {
                    retry_after: retry_hint(remaining),
                });
            }
        }

        Ok(())
    }

    /// Hard lock active. An unreadable store counts as locked.
    pub async fn is_hard_locked(&self) -> bool {
        self.read_lock(LockKind::Hard).await.map_or(true, |l| l.is_some())
    }

    /// Soft lock active. An unreadable store counts as locked.
    pub async fn is_soft_locked(&self) -> bool {
        self.read_lock(LockKind::Soft).await.map_or(true, |l| l.is_some())
    }

    /// Halt all calls for `ttl`. Returns how long the halt actually lasts.
    pub async fn trip_hard_lock(&self, ttl: Duration, reason: &str) -> Result<Duration, StoreError> {
        self.trip(LockKind::Hard, ttl, reason).await
    }

    /// Cool down for `ttl`. Returns how long the cooldown actually lasts.
    pub async fn trip_soft_lock(&self, ttl: Duration, reason: &str) -> Result<Duration, StoreError> {
        self.trip(LockKind::Soft, ttl, reason).await
    }

    /// Administrative override: remove both flags and retire the quota snapshot.
    ///
    /// The next upstream response records a fresh snapshot.
    pub async fn clear_locks(&self, actor: &str) -> Result<(), StoreError> {
        self.store.clear_locks().await?;
        events::locks_cleared(actor);
        self.audit(AuditEntry::new(actor, "clear_locks", serde_json::Value::Null)).await;
        Ok(())
    }

    /// Persist the latest quota snapshot and cool down if it is low.
    pub async fn record_quota(&self, remaining: i64, limit: i64, reset_at: i64) -> Result<(), StoreError> {
        let snapshot = QuotaSnapshot::new(remaining, limit, reset_at);
        self.store.write_quota(&snapshot).await?;
        events::quota(&snapshot);

        let settings = self.settings.get();
        if snapshot.is_low(settings.low_water_fraction) {
            self.trip_soft_lock(settings.soft_ttl(), "quota low or exhausted").await?;
        }
        Ok(())
    }

    pub async fn quota(&self) -> Result<Option<QuotaSnapshot>, StoreError> {
        self.store.read_quota().await
    }

    pub async fn state(&self) -> Result<CircuitState, StoreError> {
        let settings = self.settings.get();
        let hard = self.store.lock_remaining(LockKind::Hard).await?;
        let soft = self.store.lock_remaining(LockKind::Soft).await?;
        Ok(CircuitState {
            hard_lock: LockStatus::from_remaining(hard, settings.hard_ttl()),
            soft_lock: LockStatus::from_remaining(soft, settings.soft_ttl()),
        })
    }

    /// Build the fail-closed rejection for a store failure.
    pub fn unavailable(&self, error: StoreError) -> ShieldError {
        ShieldError::StoreUnavailable {
            reason: error.to_string(),
            retry_after: retry_hint(self.store_retry),
        }
    }

    async fn read_lock(&self, kind: LockKind) -> Result<Option<Duration>, ShieldError> {
        self.store.lock_remaining(kind).await.map_err(|e| {
            tracing::error!(lock = kind.as_str(), error = %e, "Circuit lock unreadable, failing closed");
            self.unavailable(e)
        })
    }

    async fn trip(&self, kind: LockKind, ttl: Duration, reason: &str) -> Result<Duration, StoreError> {
        if self.store.acquire_lock(kind, ttl).await? {
            events::circuit_trip(kind, ttl, reason);
            let payload = serde_json::json!({ "lock": kind.as_str(), "ttlSecs": ttl.as_secs(), "reason": reason });
            self.audit(AuditEntry::new("system", "circuit_trip", payload)).await;
            return Ok(ttl);
        }

        // Already active: report the existing expiry, never extend it.
        let remaining = self.store.lock_remaining(kind).await?;
        tracing::debug!(lock = kind.as_str(), reason = %reason, "Lock already active, trip ignored");
        Ok(remaining.map_or(ttl, |r| bounded(r, ttl)))
    }

    async fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            tracing::warn!(action = %entry.action, error = %e, "Failed to append audit entry");
        }
    }
}

/// Persistent locks report `Duration::MAX`; substitute the configured TTL.
fn bounded(remaining: Duration, fallback: Duration) -> Duration {
    if remaining == Duration::MAX {
        fallback
    } else {
        remaining
    }
}

/// A snapshot stops counting once its window has reset, or, when the
/// upstream gave no reset time, once one cooldown has passed since it was observed.
fn is_current(snapshot: &QuotaSnapshot, cooldown: Duration) -> bool {
    let now = Utc::now();
    if snapshot.reset_at > 0 {
        return now.timestamp() < snapshot.reset_at;
    }
    let cooldown = chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::zero());
    now < snapshot.observed_at + cooldown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitConfig;
    use crate::store::{KvStore, MemoryStore};

    fn breaker_with(kv: Arc<MemoryStore>) -> (CircuitBreaker, QuotaStore) {
        let store = QuotaStore::new(kv as Arc<dyn KvStore>, 100);
        let settings = Arc::new(LiveSettings::new(
            ShieldSettings::from_config(&CircuitConfig::default()),
            store.clone(),
        ));
        (CircuitBreaker::new(store.clone(), settings, Duration::from_secs(5)), store)
    }

    fn breaker() -> CircuitBreaker {
        breaker_with(Arc::new(MemoryStore::new())).0
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_circuit_admits() {
        let breaker = breaker();
        assert!(breaker.admit().await.is_ok());
        assert!(!breaker.is_hard_locked().await);
        assert!(!breaker.is_soft_locked().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_lock_takes_precedence() {
        let breaker = breaker();
        breaker.trip_soft_lock(Duration::from_secs(60), "test").await.unwrap();
        breaker.trip_hard_lock(Duration::from_secs(300), "test").await.unwrap();

        match breaker.admit().await {
            Err(ShieldError::Halted { retry_after }) => assert_eq!(retry_after, 300),
            other => panic!("expected Halted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_does_not_extend_active_lock() {
        let breaker = breaker();
        let first = breaker.trip_soft_lock(Duration::from_secs(60), "first").await.unwrap();
        assert_eq!(first, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = breaker.trip_soft_lock(Duration::from_secs(60), "second").await.unwrap();
        assert_eq!(second, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(!breaker.is_soft_locked().await);
        assert!(breaker.admit().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_lock_expires() {
        let breaker = breaker();
        breaker.trip_hard_lock(Duration::from_secs(300), "blocked").await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(breaker.is_hard_locked().await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!breaker.is_hard_locked().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_trips_soft_lock() {
        let breaker = breaker();
        breaker.record_quota(0, 100, 0).await.unwrap();
        assert!(breaker.is_soft_locked().await);

        match breaker.admit().await {
            Err(ShieldError::Cooldown { retry_after }) => assert_eq!(retry_after, 60),
            other => panic!("expected Cooldown, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_exhausted_snapshot_trips_on_next_admission() {
        let (breaker, store) = breaker_with(Arc::new(MemoryStore::new()));
        // Written by another instance without tripping the lock.
        store.write_quota(&QuotaSnapshot::new(0, 100, 0)).await.unwrap();

        assert!(matches!(breaker.admit().await, Err(ShieldError::Cooldown { retry_after: 60 })));
        assert!(breaker.is_soft_locked().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_past_reset_is_ignored() {
        let (breaker, store) = breaker_with(Arc::new(MemoryStore::new()));
        let reset_in_past = Utc::now().timestamp() - 10;
        store.write_quota(&QuotaSnapshot::new(0, 100, reset_in_past)).await.unwrap();

        assert!(breaker.admit().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_quota_does_not_trip() {
        let breaker = breaker();
        breaker.record_quota(50, 100, 0).await.unwrap();
        assert!(!breaker.is_soft_locked().await);
        assert_eq!(breaker.quota().await.unwrap().map(|q| q.remaining), Some(50));
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let kv = Arc::new(MemoryStore::new());
        let (breaker, _) = breaker_with(kv.clone());
        kv.set_offline(true);

        assert!(breaker.is_hard_locked().await);
        match breaker.admit().await {
            Err(ShieldError::StoreUnavailable { retry_after, .. }) => assert_eq!(retry_after, 5),
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_locks_and_audit() {
        let (breaker, store) = breaker_with(Arc::new(MemoryStore::new()));
        breaker.trip_hard_lock(Duration::from_secs(300), "blocked").await.unwrap();
        breaker.clear_locks("admin").await.unwrap();

        assert!(breaker.admit().await.is_ok());
        let actions: Vec<_> = store
            .read_audit(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["clear_locks", "circuit_trip"]);

        let state = breaker.state().await.unwrap();
        assert!(!state.hard_lock.active);
        assert!(!state.soft_lock.active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_locks_sticks_over_exhausted_snapshot() {
        let breaker = breaker();
        let reset_in_an_hour = Utc::now().timestamp() + 3600;
        breaker.record_quota(0, 100, reset_in_an_hour).await.unwrap();
        assert!(breaker.is_soft_locked().await);

        breaker.clear_locks("admin").await.unwrap();

        assert!(breaker.admit().await.is_ok());
        assert!(!breaker.is_soft_locked().await);
        assert_eq!(breaker.quota().await.unwrap(), None);
    }
}
