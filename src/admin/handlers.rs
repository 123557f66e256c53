use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::auth::AdminActor;
use crate::error::ShieldError;
use crate::http::server::AppState;
use crate::resilience::{CircuitState, SchedulerStats, SettingsError, SettingsUpdate, ShieldSettings};
use crate::store::{AuditEntry, QuotaSnapshot};

/// Body of `GET /admin/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub circuit: CircuitState,
    pub quota: Option<QuotaSnapshot>,
    pub scheduler: SchedulerStats,
    pub settings: ShieldSettings,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// Circuit, quota, scheduler and settings in one view.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<SystemStatus>, ShieldError> {
    let circuit = state.breaker.state().await.map_err(|e| state.breaker.unavailable(e))?;
    let quota = state.breaker.quota().await.map_err(|e| state.breaker.unavailable(e))?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        circuit,
        quota,
        scheduler: state.scheduler.stats(),
        settings: state.settings.get(),
    }))
}

/// Last quota snapshot, `null` before the first upstream response.
pub async fn get_quota(State(state): State<AppState>) -> Result<Json<Option<QuotaSnapshot>>, ShieldError> {
    let quota = state.breaker.quota().await.map_err(|e| state.breaker.unavailable(e))?;
    Ok(Json(quota))
}

/// Current live settings.
pub async fn get_settings(State(state): State<AppState>) -> Json<ShieldSettings> {
    Json(state.settings.get())
}

/// Apply a partial settings update and return the result.
pub async fn put_settings(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<ShieldSettings>, ShieldError> {
    match state.settings.update(&update, &actor.0).await {
        Ok(settings) => Ok(Json(settings)),
        Err(SettingsError::Invalid(reason)) => Err(ShieldError::InvalidRequest(reason)),
        Err(SettingsError::Store(e)) => Err(state.breaker.unavailable(e)),
    }
}

/// Clear both locks and return the circuit state afterwards.
pub async fn clear_locks(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
) -> Result<Json<CircuitState>, ShieldError> {
    state
        .breaker
        .clear_locks(&actor.0)
        .await
        .map_err(|e| state.breaker.unavailable(e))?;
    let circuit = state.breaker.state().await.map_err(|e| state.breaker.unavailable(e))?;
    Ok(Json(circuit))
}

/// Most recent audit entries first, at most `limit`.
pub async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ShieldError> {
    let limit = query.limit.unwrap_or(state.config.circuit.audit_len);
    let entries = state
        .store
        .read_audit(limit)
        .await
        .map_err(|e| state.breaker.unavailable(e))?;
    Ok(Json(entries))
}
