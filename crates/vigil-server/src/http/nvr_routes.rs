// crates/vigil-server/src/http/nvr_routes.rs
// ============================================================================
// Module: NVR Routes
// Description: Recorder lifecycle handlers.
// Purpose: Expose NVR CRUD and the adapter-backed operations.
// Dependencies: axum, vigil-core, vigil-store
// ============================================================================

//! NVR lifecycle handlers. All require `nvr.manage` except reads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use serde::Deserialize;
use time::OffsetDateTime;

use vigil_core::CheckTarget;
use vigil_core::Nvr;
use vigil_core::NvrChannel;
use vigil_core::NvrId;
use vigil_core::NvrVendor;
use vigil_core::PlainCredential;
use vigil_core::SiteId;
use vigil_store::NewNvr;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::nvr_ops::ProvisionReport;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// NVR creation body.
#[derive(Debug, Deserialize)]
pub struct CreateNvrBody {
    /// Owning site.
    pub site_id: SiteId,
    /// Display name.
    pub display_name: String,
    /// Device IP address.
    pub ip: std::net::IpAddr,
    /// Device port.
    pub port: u16,
    /// Vendor label.
    pub vendor: NvrVendor,
    /// Device credential.
    pub credential: PlainCredential,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /nvrs`.
pub async fn create(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(body): Json<CreateNvrBody>,
) -> Result<Json<Nvr>, ApiError> {
    state
        .rbac
        .require(&auth, "nvr.manage", CheckTarget::Site(body.site_id))
        .map_err(ApiError::from)?;
    if body.port == 0 {
        return Err(ApiError::validation("port", "port must be 1-65535"));
    }
    let new = NewNvr {
        site_id: body.site_id,
        display_name: body.display_name,
        ip: body.ip,
        port: body.port,
        vendor: body.vendor,
    };
    let nvr = state
        .nvrs
        .create_nvr(&auth, &new, &body.credential, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(nvr))
}

/// `GET /nvrs`.
pub async fn list(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<Vec<Nvr>>, ApiError> {
    state.rbac.require(&auth, "nvr.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let nvrs = state.nvrs.list_nvrs(&auth).map_err(ApiError::from)?;
    Ok(Json(nvrs))
}

/// Requires a permission on an NVR's site; denies render as not-found.
fn require_nvr(
    state: &SharedState,
    auth: &AuthContext,
    nvr_id: NvrId,
    permission: &str,
) -> Result<Nvr, ApiError> {
    let nvr = state.nvrs.get_nvr(auth, nvr_id).map_err(ApiError::from)?;
    state
        .rbac
        .require(auth, permission, CheckTarget::Site(nvr.site_id))
        .map_err(|_| ApiError::not_found())?;
    Ok(nvr)
}

/// `GET /nvrs/{id}`.
pub async fn get_one(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<Nvr>, ApiError> {
    let nvr = require_nvr(&state, &auth, nvr_id, "nvr.view")?;
    Ok(Json(nvr))
}

/// `DELETE /nvrs/{id}`.
pub async fn delete_one(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_nvr(&state, &auth, nvr_id, "nvr.manage")?;
    state.nvrs.delete_nvr(&auth, nvr_id, OffsetDateTime::now_utc()).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /nvrs/{id}/test-connection`.
pub async fn test_connection(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_nvr(&state, &auth, nvr_id, "nvr.manage")?;
    let status = state
        .nvrs
        .test_connection(&auth, nvr_id, OffsetDateTime::now_utc())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}

/// `POST /nvrs/{id}/discover-channels`.
pub async fn discover_channels(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<Vec<NvrChannel>>, ApiError> {
    require_nvr(&state, &auth, nvr_id, "nvr.manage")?;
    let channels = state.nvrs.discover_channels(&auth, nvr_id).await.map_err(ApiError::from)?;
    Ok(Json(channels))
}

/// `POST /nvrs/{id}/validate-channels`.
pub async fn validate_channels(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<Vec<NvrChannel>>, ApiError> {
    require_nvr(&state, &auth, nvr_id, "nvr.manage")?;
    let channels = state
        .nvrs
        .validate_channels(&auth, nvr_id, OffsetDateTime::now_utc())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(channels))
}

/// `POST /nvrs/{id}/provision-cameras`.
pub async fn provision_cameras(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(nvr_id): Path<NvrId>,
) -> Result<Json<ProvisionReport>, ApiError> {
    let nvr = require_nvr(&state, &auth, nvr_id, "nvr.manage")?;
    state
        .rbac
        .require(&auth, "camera.create", CheckTarget::Site(nvr.site_id))
        .map_err(ApiError::from)?;
    let report = state
        .nvrs
        .provision_cameras(&auth, nvr_id, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(report))
}
