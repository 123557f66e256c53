use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ShieldError;
use crate::http::server::AppState;

/// Optional header naming the person behind an admin call, for the audit log.
pub const ACTOR_HEADER: &str = "x-shield-actor";

/// Identity recorded in audit entries for admin actions.
#[derive(Debug, Clone)]
pub struct AdminActor(pub String);

/// Admit only admin-key holders and tag the request with its `AdminActor`.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let access = state.authorizer.authorize(request.headers()).await;
    if !access.is_admin {
        tracing::warn!(path = %request.uri().path(), "Rejected unprivileged admin request");
        return ShieldError::Unauthorized.into_response();
    }

    let actor = request
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("admin")
        .to_string();
    request.extensions_mut().insert(AdminActor(actor));
    next.run(request).await
}
