//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway request:
//!     → circuit_breaker.rs (hard lock, soft lock, stale-free quota check)
//!     → scheduler.rs (FIFO slot, pacing, breaker re-check)
//!         → timeouts.rs (deadline around the upstream call)
//!         → circuit_breaker.rs (record quota, trip on block marker)
//! ```
//!
//! # Design Decisions
//! - Breaker state lives in the shared store; the scheduler bound is per process
//! - Every upstream call has a deadline
//! - No automatic retries; callers receive a retry hint instead
//! - Settings are live: admin updates reach every instance via the store

pub mod circuit_breaker;
pub mod scheduler;
pub mod settings;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitState, LockStatus};
pub use scheduler::{RequestScheduler, SchedulerStats};
pub use settings::{LiveSettings, SettingsError, SettingsUpdate, ShieldSettings};
