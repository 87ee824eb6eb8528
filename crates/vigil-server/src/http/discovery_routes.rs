// crates/vigil-server/src/http/discovery_routes.rs
// ============================================================================
// Module: Discovery Routes
// Description: WS-Discovery run and device probe handlers.
// Purpose: Expose the async discovery job surface.
// Dependencies: axum, vigil-core
// ============================================================================

//! Discovery run and device handlers; all require `discovery.run`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use serde::Deserialize;
use time::OffsetDateTime;

use vigil_core::CheckTarget;
use vigil_core::DeviceId;
use vigil_core::DiscoveredDevice;
use vigil_core::DiscoveryRun;
use vigil_core::DiscoveryRunId;
use vigil_core::SiteId;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Discovery start body.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunBody {
    /// Optional site restriction.
    pub site_id: Option<SiteId>,
}

/// Device listing query.
#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    /// Restrict to one run.
    pub run_id: Option<DiscoveryRunId>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /onvif/discovery-runs`.
pub async fn start_run(
    State(state): State<SharedState>,
    auth: AuthContext,
    body: Option<Json<StartRunBody>>,
) -> Result<Json<DiscoveryRun>, ApiError> {
    state.rbac.require(&auth, "discovery.run", CheckTarget::Tenant).map_err(ApiError::from)?;
    let site_id = body.map(|Json(body)| body.site_id).unwrap_or_default();
    let run = std::sync::Arc::clone(&state.discovery)
        .start_discovery(&auth, site_id, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(run))
}

/// `GET /onvif/discovery-runs/{id}`.
pub async fn get_run(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(run_id): Path<DiscoveryRunId>,
) -> Result<Json<DiscoveryRun>, ApiError> {
    state.rbac.require(&auth, "discovery.run", CheckTarget::Tenant).map_err(ApiError::from)?;
    let run = state.discovery.get_run(&auth, run_id).map_err(ApiError::from)?;
    Ok(Json(run))
}

/// `GET /onvif/discovered-devices`.
pub async fn list_devices(
    State(state): State<SharedState>,
    auth: AuthContext,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<Vec<DiscoveredDevice>>, ApiError> {
    state.rbac.require(&auth, "discovery.run", CheckTarget::Tenant).map_err(ApiError::from)?;
    let devices = state.discovery.list_devices(&auth, query.run_id).map_err(ApiError::from)?;
    Ok(Json(devices))
}

/// `POST /onvif/discovered-devices/{id}/probe`.
pub async fn probe_device(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(device_id): Path<DeviceId>,
) -> Result<Json<DiscoveredDevice>, ApiError> {
    state.rbac.require(&auth, "discovery.run", CheckTarget::Tenant).map_err(ApiError::from)?;
    let discovery = std::sync::Arc::clone(&state.discovery);
    let device = tokio::task::spawn_blocking(move || {
        discovery.probe_device(&auth, device_id, OffsetDateTime::now_utc())
    })
    .await
    .map_err(|_| ApiError::from(vigil_core::DomainError::internal("probe task failed")))?
    .map_err(ApiError::from)?;
    Ok(Json(device))
}
