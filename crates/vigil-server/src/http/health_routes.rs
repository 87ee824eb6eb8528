// crates/vigil-server/src/http/health_routes.rs
// ============================================================================
// Module: Health Routes
// Description: Camera and NVR health read handlers plus manual recheck.
// Purpose: Expose probe state, bounded history, and the alert surface.
// Dependencies: axum, vigil-core, vigil-store
// ============================================================================

//! Health read handlers; all require `health.view`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use serde::Deserialize;
use serde::Serialize;

use vigil_core::Alert;
use vigil_core::CameraHealth;
use vigil_core::CameraId;
use vigil_core::CheckTarget;
use vigil_core::HealthHistoryEntry;
use vigil_core::NvrChannel;
use vigil_core::NvrId;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs a tenant-bound store closure off the async workers.
async fn with_tenant<T: Send + 'static>(
    state: &SharedState,
    auth: &AuthContext,
    f: impl FnOnce(&mut postgres::Transaction<'_>) -> Result<T, vigil_store::PgStoreError>
    + Send
    + 'static,
) -> Result<T, ApiError> {
    let store = Arc::clone(&state.store);
    let tenant_id = auth.tenant_id;
    tokio::task::spawn_blocking(move || store.with_tenant(tenant_id, f))
        .await
        .map_err(|_| ApiError::from(vigil_core::DomainError::internal("store task failed")))?
        .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))
}

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum entries returned.
    pub limit: Option<i64>,
}

/// NVR health summary entry.
#[derive(Debug, Serialize)]
pub struct NvrSummaryEntry {
    /// Subject NVR.
    pub nvr_id: NvrId,
    /// Display name.
    pub display_name: String,
    /// Last observed status label.
    pub status: &'static str,
    /// When the status last changed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_status_at: Option<time::OffsetDateTime>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /cameras/health`.
pub async fn list_camera_health(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<Vec<CameraHealth>>, ApiError> {
    state.rbac.require(&auth, "health.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let health = with_tenant(&state, &auth, vigil_store::health::list_health).await?;
    Ok(Json(health))
}

/// `GET /cameras/{id}/health`.
pub async fn camera_health(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<CameraHealth>, ApiError> {
    let camera = crate::http::camera_routes::require_camera(&state, &auth, camera_id, "health.view")?;
    let health =
        with_tenant(&state, &auth, move |tx| vigil_store::health::get_health(tx, camera.id))
            .await?
            .ok_or_else(ApiError::not_found)?;
    Ok(Json(health))
}

/// `GET /cameras/{id}/health/history`.
pub async fn camera_history(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HealthHistoryEntry>>, ApiError> {
    crate::http::camera_routes::require_camera(&state, &auth, camera_id, "health.view")?;
    let limit = query.limit.unwrap_or(50);
    let history = with_tenant(&state, &auth, move |tx| {
        vigil_store::health::list_history(tx, camera_id, limit)
    })
    .await?;
    Ok(Json(history))
}

/// `POST /cameras/{id}/health-recheck`.
pub async fn recheck(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::http::camera_routes::require_camera(&state, &auth, camera_id, "health.view")?;
    let ran = state.health.recheck_camera(auth.tenant_id, camera_id).await;
    if !ran {
        return Err(ApiError::not_found());
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /alerts/cameras`.
pub async fn camera_alerts(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<Vec<Alert>>, ApiError> {
    state.rbac.require(&auth, "health.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let alerts =
        with_tenant(&state, &auth, |tx| vigil_store::health::list_alerts(tx, true)).await?;
    Ok(Json(alerts))
}

/// `GET /health/nvrs/summary`.
pub async fn nvr_summary(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<Vec<NvrSummaryEntry>>, ApiError> {
    state.rbac.require(&auth, "health.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let nvrs =
        with_tenant(&state, &auth, |tx| vigil_store::nvrs::list_nvrs(tx, false)).await?;
    let summary = nvrs
        .into_iter()
        .map(|nvr| NvrSummaryEntry {
            nvr_id: nvr.id,
            display_name: nvr.display_name,
            status: nvr.status.as_str(),
            last_status_at: nvr.last_status_at,
        })
        .collect();
    Ok(Json(summary))
}

/// `GET /health/nvrs/{id}/channels`.
pub async fn nvr_channels(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<Vec<NvrChannel>>, ApiError> {
    state.rbac.require(&auth, "health.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let channels =
        with_tenant(&state, &auth, move |tx| vigil_store::nvrs::list_channels(tx, nvr_id))
            .await?;
    Ok(Json(channels))
}
