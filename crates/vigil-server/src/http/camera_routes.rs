// crates/vigil-server/src/http/camera_routes.rs
// ============================================================================
// Module: Camera Routes
// Description: Camera inventory, credential, profile, and group handlers.
// Purpose: Enforce RBAC at camera/site scope before every inventory call.
// Dependencies: axum, vigil-core, vigil-store
// ============================================================================

//! ## Overview
//! Camera-scoped checks resolve the camera's site first, then apply site
//! semantics; a permission deny on a specific camera renders as not-found
//! so cross-tenant and cross-site existence never leaks. Listing filters
//! to the caller's granted sites instead of denying outright.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use serde::Deserialize;
use time::OffsetDateTime;

use vigil_core::Camera;
use vigil_core::CameraGroup;
use vigil_core::CameraId;
use vigil_core::CheckTarget;
use vigil_core::GroupId;
use vigil_core::MediaProfile;
use vigil_core::NewCamera;
use vigil_core::PlainCredential;
use vigil_core::SiteId;
use vigil_core::StreamSelection;
use vigil_store::CameraFilter;
use vigil_store::CameraUpdate;

use crate::auth::AuthContext;
use crate::camera_ops::BulkItemOutcome;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Authorization Helpers
// ============================================================================

/// Requires a permission on a camera, resolving its site scope. A deny is
/// indistinguishable from the camera not existing.
pub(crate) fn require_camera(
    state: &SharedState,
    auth: &AuthContext,
    camera_id: CameraId,
    permission: &str,
) -> Result<Camera, ApiError> {
    let camera = state.cameras.get_camera(auth, camera_id).map_err(ApiError::from)?;
    state
        .rbac
        .require(auth, permission, CheckTarget::Site(camera.site_id))
        .map_err(|_| ApiError::not_found())?;
    Ok(camera)
}

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Camera creation body: inventory fields plus optional device credential.
#[derive(Debug, Deserialize)]
pub struct CreateCameraBody {
    /// Inventory fields.
    #[serde(flatten)]
    pub camera: NewCamera,
    /// Device credential stored in the vault when present.
    pub credential: Option<PlainCredential>,
}

/// Bulk creation body.
#[derive(Debug, Deserialize)]
pub struct BulkCreateBody {
    /// Items to create.
    pub cameras: Vec<NewCamera>,
}

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restrict to one site.
    pub site_id: Option<SiteId>,
    /// Trigram search term.
    pub search: Option<String>,
    /// Only enabled cameras.
    #[serde(default)]
    pub enabled_only: bool,
    /// Page size.
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

/// Group creation body.
#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    /// Group name.
    pub name: String,
    /// Optional site restriction.
    pub site_id: Option<SiteId>,
}

/// Group membership replacement body.
#[derive(Debug, Deserialize)]
pub struct MembersBody {
    /// Complete member list.
    pub camera_ids: Vec<CameraId>,
}

// ============================================================================
// SECTION: Camera Handlers
// ============================================================================

/// `POST /cameras`.
pub async fn create(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(body): Json<CreateCameraBody>,
) -> Result<Json<Camera>, ApiError> {
    state
        .rbac
        .require(&auth, "camera.create", CheckTarget::Site(body.camera.site_id))
        .map_err(ApiError::from)?;
    let now = OffsetDateTime::now_utc();
    let camera = state.cameras.create_camera(&auth, &body.camera, now).map_err(ApiError::from)?;
    if let Some(credential) = &body.credential {
        state
            .cameras
            .set_credential(&auth, camera.id, credential, now)
            .map_err(ApiError::from)?;
    }
    Ok(Json(camera))
}

/// `GET /cameras`.
pub async fn list(
    State(state): State<SharedState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Camera>>, ApiError> {
    let grants = state.rbac.grants(auth.tenant_id, auth.user_id).map_err(ApiError::from)?;
    let Some(view) = grants.grant("camera.view") else {
        return Ok(Json(Vec::new()));
    };
    let filter = CameraFilter {
        site_id: query.site_id,
        search: query.search,
        enabled_only: query.enabled_only,
        limit: query.limit,
        offset: query.offset,
    };
    let mut cameras = state.cameras.list_cameras(&auth, &filter).map_err(ApiError::from)?;
    if !view.tenant_wide {
        // Site-scoped callers only see their sites.
        let sites = view.site_ids.clone();
        cameras.retain(|camera| sites.contains(&camera.site_id));
    }
    Ok(Json(cameras))
}

/// `GET /cameras/{id}`.
pub async fn get_one(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<Camera>, ApiError> {
    let camera = require_camera(&state, &auth, camera_id, "camera.view")?;
    Ok(Json(camera))
}

/// `PUT /cameras/{id}`.
pub async fn update(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Json(body): Json<CameraUpdateBody>,
) -> Result<Json<Camera>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    let update = CameraUpdate {
        display_name: body.display_name,
        manufacturer: body.manufacturer,
        model: body.model,
        serial: body.serial,
        mac: body.mac,
        tags: body.tags,
    };
    let camera = state
        .cameras
        .update_camera(&auth, camera_id, &update, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(camera))
}

/// Camera update body.
#[derive(Debug, Deserialize)]
pub struct CameraUpdateBody {
    /// New display name.
    pub display_name: Option<String>,
    /// New manufacturer.
    pub manufacturer: Option<String>,
    /// New model.
    pub model: Option<String>,
    /// New serial.
    pub serial: Option<String>,
    /// New MAC.
    pub mac: Option<String>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
}

/// `DELETE /cameras/{id}`.
pub async fn delete_one(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.delete")?;
    state
        .cameras
        .delete_camera(&auth, camera_id, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /cameras/bulk`.
pub async fn bulk_create(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(body): Json<BulkCreateBody>,
) -> Result<Json<Vec<BulkItemOutcome>>, ApiError> {
    for item in &body.cameras {
        state
            .rbac
            .require(&auth, "camera.create", CheckTarget::Site(item.site_id))
            .map_err(ApiError::from)?;
    }
    let outcomes = state
        .cameras
        .bulk_create(&auth, &body.cameras, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(outcomes))
}

/// `POST /cameras/{id}/enable`.
pub async fn enable(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    state
        .cameras
        .set_enabled(&auth, camera_id, true, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "enabled": true })))
}

/// `POST /cameras/{id}/disable`.
pub async fn disable(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    state
        .cameras
        .set_enabled(&auth, camera_id, false, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "enabled": false })))
}

/// `PUT /cameras/{id}/credentials`.
pub async fn set_credentials(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Json(credential): Json<PlainCredential>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    state
        .cameras
        .set_credential(&auth, camera_id, &credential, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /cameras/{id}/media-profiles`.
pub async fn list_profiles(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<Vec<MediaProfile>>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.view")?;
    let profiles = state.cameras.list_profiles(&auth, camera_id).map_err(ApiError::from)?;
    Ok(Json(profiles))
}

/// `PUT /cameras/{id}/media-profiles`.
pub async fn replace_profiles(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Json(profiles): Json<Vec<MediaProfile>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    state.cameras.replace_profiles(&auth, camera_id, &profiles).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `PUT /cameras/{id}/stream-selection`.
pub async fn set_stream_selection(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Json(mut selection): Json<StreamSelection>,
) -> Result<Json<StreamSelection>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.update")?;
    selection.camera_id = camera_id;
    let stored = state.cameras.set_stream_selection(&auth, &selection).map_err(ApiError::from)?;
    Ok(Json(stored))
}

/// `POST /cameras/{id}/validate-rtsp`.
pub async fn validate_rtsp(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_camera(&state, &auth, camera_id, "camera.control")?;
    let outcome = state.cameras.validate_rtsp(&auth, camera_id).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "status": outcome.status,
        "rtt_ms": outcome.rtt_ms,
        "reason": outcome.reason,
    })))
}

// ============================================================================
// SECTION: Group Handlers
// ============================================================================

/// `POST /camera-groups`.
pub async fn create_group(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(body): Json<CreateGroupBody>,
) -> Result<Json<CameraGroup>, ApiError> {
    state.rbac.require(&auth, "camera.update", CheckTarget::Tenant).map_err(ApiError::from)?;
    let group =
        state.cameras.create_group(&auth, body.site_id, &body.name).map_err(ApiError::from)?;
    Ok(Json(group))
}

/// `GET /camera-groups`.
pub async fn list_groups(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<Vec<CameraGroup>>, ApiError> {
    state.rbac.require(&auth, "camera.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let groups = state.cameras.list_groups(&auth).map_err(ApiError::from)?;
    Ok(Json(groups))
}

/// `DELETE /camera-groups/{id}`.
pub async fn delete_group(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(group_id): Path<GroupId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rbac.require(&auth, "camera.update", CheckTarget::Tenant).map_err(ApiError::from)?;
    state.cameras.delete_group(&auth, group_id).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `PUT /camera-groups/{id}/members`.
pub async fn replace_members(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(group_id): Path<GroupId>,
    Json(body): Json<MembersBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rbac.require(&auth, "camera.update", CheckTarget::Tenant).map_err(ApiError::from)?;
    state
        .cameras
        .replace_group_members(&auth, group_id, &body.camera_ids)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
