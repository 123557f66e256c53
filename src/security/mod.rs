//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → body size limit (tower-http, configured from security.max_body_size)
//!     → access_control.rs (may invoke? is admin?)
//!     → gateway or admin handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: a configured caller list rejects unknown keys
//! - The gateway is read-only regardless of who calls it

pub mod access_control;

pub use access_control::{bearer_token, ApiKeyAuthorizer, Authorizer, CallerAccess};
