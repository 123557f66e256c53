//! Safety Shield
//!
//! A read-only gateway between callers and a rate-limited upstream API.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                    SAFETY SHIELD                     │
//!                          │                                                      │
//!     Caller GET           │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐    │
//!     ─────────────────────┼─▶│  http   │──▶│ gateway │──▶│ circuit breaker  │    │
//!                          │  │ server  │   │ handler │   │ hard / soft lock │    │
//!                          │  └─────────┘   └────┬────┘   └────────┬─────────┘    │
//!                          │                     │                 │              │
//!                          │                     ▼                 ▼              │
//!                          │              ┌────────────┐    ┌─────────────┐       │
//!                          │              │  response  │    │ quota store │◀──┐   │
//!                          │              │   cache    │    │ (shared KV) │   │   │
//!                          │              └────────────┘    └─────────────┘   │   │
//!                          │                     │ miss                       │   │
//!                          │                     ▼                            │   │
//!     Caller response      │              ┌────────────┐    ┌─────────────┐   │   │
//!     ◀────────────────────┼──────────────│ scheduler  │───▶│  upstream   │───┘   ┼──▶ Upstream API
//!                          │              │ FIFO, bound│    │   client    │       │
//!                          │              └────────────┘    └─────────────┘       │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use safety_shield::config::{apply_env_overrides, load_config, validate_config, ConfigError};
use safety_shield::lifecycle::{build_server, signals, Shutdown};
use safety_shield::observability::{logging, metrics};
use safety_shield::ShieldConfig;

#[derive(Parser)]
#[command(name = "safety-shield")]
#[command(about = "Read-only gateway protecting a rate-limited upstream API", long_about = None)]
struct Args {
    /// Path to the TOML config file. Defaults plus environment overrides when omitted.
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = ShieldConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "safety-shield starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        route_prefix = %config.listener.route_prefix,
        max_concurrent = config.scheduler.max_concurrent,
        store = ?config.store.backend,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = build_server(config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
