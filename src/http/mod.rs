//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, routes)
//!     → request.rs (request ID, trace span)
//!     → gateway.rs (read-only policy, breaker, cache, scheduler)
//!     → response.rs (error taxonomy → status + JSON body)
//!     → Send to client
//! ```

pub mod gateway;
pub mod request;
pub mod response;
pub mod server;

pub use gateway::{CacheStatus, Gateway, GatewayReply, X_CACHE};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::ErrorBody;
pub use server::{AppState, HttpServer};
