//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTLs > 0, fractions in range, bounds non-zero)
//! - Check cross-field requirements (redis backend needs a URL)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ShieldConfig, StoreBackend};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every error found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if !config.listener.route_prefix.starts_with('/') || config.listener.route_prefix.ends_with('/') {
        errors.push(ValidationError::new(
            "listener.route_prefix",
            "must start with '/' and must not end with '/'",
        ));
    }

    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    match url::Url::parse(&config.upstream.base_url) {
        Ok(url) if url.cannot_be_a_base() => {
            errors.push(ValidationError::new("upstream.base_url", "cannot be used as a base URL"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }
    if config.upstream.blocked_header.trim().is_empty() {
        errors.push(ValidationError::new("upstream.blocked_header", "must not be empty"));
    }

    if config.scheduler.max_concurrent == 0 {
        errors.push(ValidationError::new("scheduler.max_concurrent", "must be greater than 0"));
    }
    if config.scheduler.max_queue == 0 {
        errors.push(ValidationError::new("scheduler.max_queue", "must be greater than 0"));
    }
    if config.scheduler.max_wait_ms == 0 {
        errors.push(ValidationError::new("scheduler.max_wait_ms", "must be greater than 0"));
    }
    // Queue wait plus the upstream call must finish inside the listener deadline.
    let scheduled_ms = config
        .scheduler
        .max_wait_ms
        .saturating_add(config.upstream.timeout_secs.saturating_mul(1000));
    if scheduled_ms >= config.listener.request_timeout_secs.saturating_mul(1000) {
        errors.push(ValidationError::new(
            "scheduler.max_wait_ms",
            "queue wait plus upstream.timeout_secs must be shorter than listener.request_timeout_secs",
        ));
    }

    if config.circuit.hard_lock_ttl_secs == 0 {
        errors.push(ValidationError::new("circuit.hard_lock_ttl_secs", "must be greater than 0"));
    }
    if config.circuit.soft_lock_ttl_secs == 0 {
        errors.push(ValidationError::new("circuit.soft_lock_ttl_secs", "must be greater than 0"));
    }
    if !(0.0..1.0).contains(&config.circuit.low_water_fraction) {
        errors.push(ValidationError::new(
            "circuit.low_water_fraction",
            "must be in the range [0.0, 1.0)",
        ));
    }
    if config.circuit.audit_len == 0 {
        errors.push(ValidationError::new("circuit.audit_len", "must be greater than 0"));
    }
    if config.circuit.settings_refresh_secs == 0 {
        errors.push(ValidationError::new("circuit.settings_refresh_secs", "must be greater than 0"));
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0 when caching is enabled"));
    }

    if config.store.backend == StoreBackend::Redis && config.store.redis_url.is_none() {
        errors.push(ValidationError::new("store.redis_url", "required for the redis backend"));
    }

    if config.auth.admin_key.trim().is_empty() {
        errors.push(ValidationError::new("auth.admin_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
