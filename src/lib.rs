//! Safety Shield: a read-only, rate-limit-aware gateway in front of a
//! third-party API that punishes abusive clients.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod upstream;

pub use config::ShieldConfig;
pub use error::ShieldError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
