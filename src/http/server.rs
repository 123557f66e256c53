//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wire the circuit breaker, scheduler, cache and upstream into `AppState`
//! - Create the Axum Router: gateway, health and admin routes
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Give listener timeouts the same JSON body and retry hint as every other rejection
//! - Serve until the shutdown coordinator fires
//! - Run the live-settings refresher alongside the listener

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::cache::ResponseCache;
use crate::config::ShieldConfig;
use crate::error::ShieldError;
use crate::http::gateway::{gateway_handler, Gateway};
use crate::http::request::{make_span, UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::resilience::{CircuitBreaker, LiveSettings, RequestScheduler, ShieldSettings};
use crate::security::{ApiKeyAuthorizer, Authorizer};
use crate::store::{KvStore, QuotaStore};
use crate::upstream::Upstream;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ShieldConfig>,
    pub gateway: Arc<Gateway>,
    pub breaker: Arc<CircuitBreaker>,
    pub scheduler: Arc<RequestScheduler>,
    pub settings: Arc<LiveSettings>,
    pub store: QuotaStore,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(config: ShieldConfig, kv: Arc<dyn KvStore>, upstream: Arc<dyn Upstream>) -> Self {
        let store = QuotaStore::new(kv.clone(), config.circuit.audit_len);
        let settings = Arc::new(LiveSettings::new(
            ShieldSettings::from_config(&config.circuit),
            store.clone(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            store.clone(),
            settings.clone(),
            Duration::from_secs(config.circuit.store_retry_secs),
        ));
        let scheduler = Arc::new(RequestScheduler::new(
            &config.scheduler,
            Duration::from_secs(config.upstream.timeout_secs),
            breaker.clone(),
        ));
        let authorizer: Arc<dyn Authorizer> = Arc::new(ApiKeyAuthorizer::new(&config.auth));
        let gateway = Arc::new(Gateway::new(
            breaker.clone(),
            scheduler.clone(),
            ResponseCache::new(kv, &config.cache),
            upstream,
            authorizer.clone(),
            &config.upstream,
        ));

        Self {
            config: Arc::new(config),
            gateway,
            breaker,
            scheduler,
            settings,
            store,
            authorizer,
        }
    }
}

/// HTTP server for the shield.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ShieldConfig, kv: Arc<dyn KvStore>, upstream: Arc<dyn Upstream>) -> Self {
        let state = AppState::new(config, kv, upstream);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();
        let gateway_route = format!("{}/{{*path}}", config.listener.route_prefix);

        Router::new()
            .route(&gateway_route, any(gateway_handler))
            .route("/health", get(health_handler))
            .merge(setup_admin_router(state.clone()))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(middleware::map_response(timeout_rejection))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            route_prefix = %self.state.config.listener.route_prefix,
            "HTTP server starting"
        );

        if let Err(e) = self.state.settings.refresh().await {
            tracing::warn!(error = %e, "Shared shield settings unavailable, using configured defaults");
        }
        let interval = Duration::from_secs(self.state.config.circuit.settings_refresh_secs);
        let refresher = tokio::spawn(
            self.state
                .settings
                .clone()
                .run_refresher(interval, shutdown.subscribe()),
        );

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = refresher.await {
            tracing::warn!(error = %e, "Settings refresher ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `TimeoutLayer` answers with an empty 408; only it produces that status.
async fn timeout_rejection(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        tracing::warn!("Request exceeded the listener deadline");
        return ShieldError::RequestTimeout { retry_after: 1 }.into_response();
    }
    response
}

/// Liveness plus a round trip to the shared store.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "store": "up" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded", "store": "down", "error": e.to_string() })),
        )
            .into_response(),
    }
}
