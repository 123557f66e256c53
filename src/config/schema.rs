//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the safety shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address, route prefix).
    pub listener: ListenerConfig,

    /// The rate-limited third-party API.
    pub upstream: UpstreamConfig,

    /// Concurrency bound and pacing for upstream calls.
    pub scheduler: SchedulerConfig,

    /// Circuit breaker defaults.
    pub circuit: CircuitConfig,

    /// Response cache policy.
    pub cache: CacheConfig,

    /// Shared quota store backend.
    pub store: StoreConfig,

    /// Caller authorization.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path prefix under which upstream paths are forwarded.
    pub route_prefix: String,

    /// Whole-request timeout in seconds, including time queued for a slot.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            route_prefix: "/api/proxy".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every forwarded path is joined onto.
    pub base_url: String,

    /// Bearer token presented to the upstream.
    /// `SHIELD_UPSTREAM_TOKEN` overrides this at load time.
    pub token: Option<String>,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Response header whose presence means the upstream has blocked us.
    pub blocked_header: String,

    pub remaining_header: String,
    pub limit_header: String,
    pub reset_header: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.onlinescoutmanager.co.uk".to_string(),
            token: None,
            timeout_secs: 30,
            blocked_header: "X-Blocked".to_string(),
            remaining_header: "X-RateLimit-Remaining".to_string(),
            limit_header: "X-RateLimit-Limit".to_string(),
            reset_header: "X-RateLimit-Reset".to_string(),
        }
    }
}

/// Request scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum upstream calls in flight from this process.
    pub max_concurrent: usize,

    /// Minimum spacing between two dispatches in milliseconds (0 = no pacing).
    pub min_spacing_ms: u64,

    /// Maximum number of calls waiting for a slot before new ones are rejected.
    pub max_queue: usize,

    /// Longest a call may wait for its slot and dispatch time, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_spacing_ms: 0,
            max_queue: 256,
            max_wait_ms: 20_000,
        }
    }
}

/// Circuit breaker configuration.
///
/// The three tunables (`hard_lock_ttl_secs`, `soft_lock_ttl_secs`,
/// `low_water_fraction`) only seed the live settings; the admin API can
/// override them at runtime through the shared store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Halt duration after the upstream signals a block.
    pub hard_lock_ttl_secs: u64,

    /// Cooldown duration after quota exhaustion or a 429.
    pub soft_lock_ttl_secs: u64,

    /// Trip the soft lock when `remaining < limit * fraction` (0.0 = only at zero).
    pub low_water_fraction: f64,

    /// Retry hint returned when the shared store cannot be reached.
    pub store_retry_secs: u64,

    /// Maximum audit entries retained.
    pub audit_len: usize,

    /// How often live settings are re-read from the shared store.
    pub settings_refresh_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            hard_lock_ttl_secs: 300,
            soft_lock_ttl_secs: 60,
            low_water_fraction: 0.0,
            store_retry_secs: 5,
            audit_len: 100,
            settings_refresh_secs: 30,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Lifetime of a cached upstream body in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

/// Which shared store implementation to use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store. Only suitable for a single instance or tests.
    Memory,
    Redis,
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL. `REDIS_URL` overrides this at load time.
    pub redis_url: Option<String>,

    /// Prefix prepended to every key (lets deployments share one Redis).
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            key_prefix: String::new(),
        }
    }
}

/// Caller authorization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// API key for the administrative interface (Bearer token).
    pub admin_key: String,

    /// Keys allowed to call the gateway. Empty = every caller may invoke.
    pub caller_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            admin_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            caller_keys: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
        }
    }
}
