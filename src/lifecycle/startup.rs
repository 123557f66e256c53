//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the shared store
//! - Build the upstream client
//! - Assemble the HTTP server
//!
//! # Design Decisions
//! - Fail fast: an unreachable store or an unusable base URL is fatal
//! - A missing upstream token is not fatal; the gateway reports it per request

use std::sync::Arc;

use thiserror::Error;

use crate::config::ShieldConfig;
use crate::http::HttpServer;
use crate::store::{self, StoreError};
use crate::upstream::{HttpUpstream, Upstream, UpstreamFailure};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamFailure),
}

pub async fn build_server(config: ShieldConfig) -> Result<HttpServer, StartupError> {
    let kv = store::connect(&config.store).await?;
    kv.ping().await?;
    tracing::info!(backend = ?config.store.backend, "Shared store connected");

    let upstream = HttpUpstream::new(&config.upstream)?;
    if !upstream.is_configured() {
        tracing::warn!("No upstream API token configured; gateway requests will fail with CONFIGURATION_ERROR");
    }
    tracing::info!(base_url = %config.upstream.base_url, "Upstream client ready");

    Ok(HttpServer::new(config, kv, Arc::new(upstream)))
}
