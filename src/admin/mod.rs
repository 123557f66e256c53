//! Privileged operations on the shared circuit state.
//!
//! Every route requires the admin bearer key. Mutations are recorded in the
//! audit log under the acting caller's name.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Admin routes behind the admin-key middleware, to be merged into the main router.
pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/quota", get(get_quota))
        .route("/admin/settings", get(get_settings).put(put_settings))
        .route("/admin/locks/clear", post(clear_locks))
        .route("/admin/audit", get(get_audit))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
