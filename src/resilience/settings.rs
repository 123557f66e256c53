//! Live circuit tunables.
//!
//! Seeded from the config file, overridden by whatever the shared store
//! holds, changed at runtime through the admin API. Reads are lock-free
//! (`ArcSwap`); writes go to the store first so other instances pick them
//! up on their next refresh.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::CircuitConfig;
use crate::store::{AuditEntry, QuotaStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldSettings {
    pub low_water_fraction: f64,
    pub hard_lock_ttl_secs: u64,
    pub soft_lock_ttl_secs: u64,
}

impl ShieldSettings {
    pub fn from_config(config: &CircuitConfig) -> Self {
        Self {
            low_water_fraction: config.low_water_fraction,
            hard_lock_ttl_secs: config.hard_lock_ttl_secs,
            soft_lock_ttl_secs: config.soft_lock_ttl_secs,
        }
    }

    pub fn hard_ttl(&self) -> Duration {
        Duration::from_secs(self.hard_lock_ttl_secs)
    }

    pub fn soft_ttl(&self) -> Duration {
        Duration::from_secs(self.soft_lock_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..1.0).contains(&self.low_water_fraction) {
            return Err(SettingsError::Invalid("lowWaterFraction must be in [0.0, 1.0)".into()));
        }
        if self.hard_lock_ttl_secs == 0 || self.soft_lock_ttl_secs == 0 {
            return Err(SettingsError::Invalid("lock TTLs must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub low_water_fraction: Option<f64>,
    pub hard_lock_ttl_secs: Option<u64>,
    pub soft_lock_ttl_secs: Option<u64>,
}

impl SettingsUpdate {
    pub fn apply(&self, base: ShieldSettings) -> ShieldSettings {
        ShieldSettings {
            low_water_fraction: self.low_water_fraction.unwrap_or(base.low_water_fraction),
            hard_lock_ttl_secs: self.hard_lock_ttl_secs.unwrap_or(base.hard_lock_ttl_secs),
            soft_lock_ttl_secs: self.soft_lock_ttl_secs.unwrap_or(base.soft_lock_ttl_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Process-local view of the shared settings.
pub struct LiveSettings {
    current: ArcSwap<ShieldSettings>,
    store: QuotaStore,
}

impl LiveSettings {
    pub fn new(initial: ShieldSettings, store: QuotaStore) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            store,
        }
    }

    pub fn get(&self) -> ShieldSettings {
        **self.current.load()
    }

    /// Pull the shared copy. Invalid or missing copies leave the local view untouched.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        match self.store.read_settings().await? {
            Some(shared) if shared.validate().is_ok() => {
                if shared != self.get() {
                    tracing::info!(settings = ?shared, "Shield settings changed in shared store");
                    self.current.store(Arc::new(shared));
                }
            }
            Some(shared) => {
                tracing::warn!(settings = ?shared, "Ignoring invalid shield settings in shared store");
            }
            None => {}
        }
        Ok(())
    }

    /// Validate, persist, swap locally and audit.
    pub async fn update(&self, update: &SettingsUpdate, actor: &str) -> Result<ShieldSettings, SettingsError> {
        let next = update.apply(self.get());
        next.validate()?;

        self.store.write_settings(&next).await?;
        self.current.store(Arc::new(next));

        let payload = serde_json::to_value(update).unwrap_or_default();
        if let Err(e) = self
            .store
            .append_audit(&AuditEntry::new(actor, "update_shield_settings", payload))
            .await
        {
            tracing::warn!(error = %e, "Failed to record settings update in audit log");
        }

        tracing::info!(settings = ?next, actor = %actor, "Shield settings updated");
        Ok(next)
    }

    /// Periodically re-read the shared copy until shutdown.
    pub async fn run_refresher(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(error = %e, "Failed to refresh shield settings");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Settings refresher received shutdown signal, exiting loop");
                    return;
                }
            }
        }
    }
}
