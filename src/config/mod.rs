//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Circuit tunables (TTLs, low-water mark) only seed the live
//! settings; runtime changes go through the admin API and the shared store.
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, parse_config, ConfigError};
pub use validation::{validate_config, ValidationError};
pub use schema::{
    AuthConfig, CacheConfig, CircuitConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    SchedulerConfig, SecurityConfig, ShieldConfig, StoreBackend, StoreConfig, UpstreamConfig,
};
