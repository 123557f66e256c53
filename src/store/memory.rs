//! In-process store.
//!
//! Backs tests and single-instance deployments. Expiry uses the Tokio clock
//! so tests can pause and advance time.
//!
//! Expired values are dropped lazily on read and by a sweep that runs on
//! writes at most once per `SWEEP_INTERVAL`, so keys that are never read
//! again (one per cached path and query) do not accumulate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::store::{KeyTtl, KvStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Slot {
    Value {
        data: Vec<u8>,
        expires_at: Option<Instant>,
    },
    List(VecDeque<Vec<u8>>),
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        match self {
            Slot::Value {
                expires_at: Some(at),
                ..
            } => *at <= now,
            _ => false,
        }
    }
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A thread-safe key-value store living inside this process.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
    /// When set, every operation fails as if the backend were unreachable.
    offline: AtomicBool,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            offline: AtomicBool::new(false),
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones not yet reclaimed included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired value. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "Reclaimed expired store entries");
        }
        removed
    }

    /// Sweep if the last one is older than `SWEEP_INTERVAL`. Concurrent
    /// writers skip instead of queueing behind a sweep in progress.
    fn maybe_sweep(&self) {
        let now = Instant::now();
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
            return;
        }
        *last = now;
        drop(last);
        self.purge_expired();
    }

    /// Simulate an outage (or recovery) of the backend.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Read a live value, dropping it if it has expired.
    fn live_value(&self, key: &str) -> StoreResult<Option<(Vec<u8>, Option<Instant>)>> {
        let now = Instant::now();
        let found = match self.entries.get(key) {
            Some(slot) if slot.is_expired(now) => None,
            Some(slot) => match slot.value() {
                Slot::Value { data, expires_at } => Some((data.clone(), *expires_at)),
                Slot::List(_) => return Err(StoreError::WrongType(key.to_string())),
            },
            None => return Ok(None),
        };
        if found.is_none() {
            self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        }
        Ok(found)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.live_value(key)?.map(|(data, _)| data))
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.check_online()?;
        self.entries.insert(
            key.to_string(),
            Slot::Value {
                data: value.to_vec(),
                expires_at: None,
            },
        );
        self.maybe_sweep();
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.check_online()?;
        self.entries.insert(
            key.to_string(),
            Slot::Value {
                data: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        self.maybe_sweep();
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        self.check_online()?;
        let now = Instant::now();
        let slot = Slot::Value {
            data: value.to_vec(),
            expires_at: Some(now + ttl),
        };
        let written = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                true
            }
        };
        self.maybe_sweep();
        Ok(written)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.check_online()?;
        if let Some(slot) = self.entries.get(key) {
            if let Slot::List(_) = slot.value() {
                return Ok(KeyTtl::Persistent);
            }
        }
        Ok(match self.live_value(key)? {
            None => KeyTtl::Missing,
            Some((_, None)) => KeyTtl::Persistent,
            Some((_, Some(at))) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<()> {
        self.check_online()?;
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }

    async fn push_bounded(&self, key: &str, value: &[u8], max_len: usize) -> StoreResult<()> {
        self.check_online()?;
        let mut slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Slot::List(VecDeque::new()));
        match slot.value_mut() {
            Slot::List(items) => {
                items.push_front(value.to_vec());
                items.truncate(max_len);
                Ok(())
            }
            Slot::Value { .. } => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn range(&self, key: &str, count: usize) -> StoreResult<Vec<Vec<u8>>> {
        self.check_online()?;
        match self.entries.get(key) {
            Some(slot) => match slot.value() {
                Slot::List(items) => Ok(items.iter().take(count).cloned().collect()),
                Slot::Value { .. } => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_online()
    }
}
