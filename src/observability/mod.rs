//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! circuit breaker, scheduler, cache, gateway
//!     → events.rs (one named event per operational fact)
//!         → logging.rs (structured log lines)
//!         → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - JSON logs for production, pretty logs for development
//! - Request ID from the HTTP layer is attached to every log span
//! - Metrics are optional; recording without an exporter is free

pub mod events;
pub mod logging;
pub mod metrics;
