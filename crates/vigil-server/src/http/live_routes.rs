// crates/vigil-server/src/http/live_routes.rs
// ============================================================================
// Module: Live Routes
// Description: Session issuance, overlay toggles, telemetry, detections.
// Purpose: Expose the live-view broker and its companion surfaces.
// Dependencies: axum, vigil-core
// ============================================================================

//! ## Overview
//! Session issuance authorizes the camera (camera-scope `live.view`)
//! before the broker runs; the cap rejection renders the stable
//! `LIVE_LIMIT_EXCEEDED` body. Overlay toggles flip the session flag and
//! prime the demand registry; subsequent heartbeats keep demand fresh.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use serde::Deserialize;
use time::OffsetDateTime;

use vigil_core::CameraId;
use vigil_core::DetectionStream;
use vigil_core::LiveStartResponse;
use vigil_core::SessionId;
use vigil_core::StreamQuality;
use vigil_core::TelemetryEvent;
use vigil_core::ViewMode;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::live::LiveStartError;
use crate::live::StartSessionRequest;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Session issuance body.
#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    /// Target camera.
    pub camera_id: CameraId,
    /// Requested view mode.
    pub view_mode: ViewMode,
    /// Explicit quality request.
    pub quality: Option<StreamQuality>,
}

/// Detection read query.
#[derive(Debug, Deserialize)]
pub struct DetectionQuery {
    /// Stream label (`basic` or `weapon`).
    pub stream: String,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /live/sessions`.
pub async fn start_session(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(body): Json<StartSessionBody>,
) -> Result<Json<LiveStartResponse>, ApiError> {
    // Step 1: authorize the camera under the caller's tenant; a deny is
    // indistinguishable from the camera not existing.
    crate::http::camera_routes::require_camera(&state, &auth, body.camera_id, "live.view")?;
    let request = StartSessionRequest {
        camera_id: body.camera_id,
        view_mode: body.view_mode,
        quality: body.quality,
    };
    match state.live.start_session(&auth, &request, OffsetDateTime::now_utc()) {
        Ok(response) => Ok(Json(response)),
        Err(LiveStartError::LimitExceeded { active }) => Err(ApiError::live_limit(active)),
        Err(LiveStartError::Domain(err)) => Err(ApiError::from(err)),
    }
}

/// Loads a session owned by the caller, or not-found.
fn owned_session(
    state: &SharedState,
    auth: &AuthContext,
    session_id: SessionId,
    now: OffsetDateTime,
) -> Result<vigil_core::ViewerSession, ApiError> {
    let session = state
        .live
        .session_store()
        .get_session(session_id, now)
        .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))?
        .ok_or_else(ApiError::not_found)?;
    if session.tenant_id != auth.tenant_id || session.user_id != auth.user_id {
        return Err(ApiError::not_found());
    }
    Ok(session)
}

/// `POST /live/{sid}/overlay/enable`.
pub async fn overlay_enable(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(session_id): Path<SessionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let mut session = owned_session(&state, &auth, session_id, now)?;
    // Overlay permission resolves at the camera's site scope.
    crate::http::camera_routes::require_camera(&state, &auth, session.camera_id, "live.overlay")?;
    session.overlay = true;
    state
        .live
        .session_store()
        .update_session(&session)
        .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))?;
    state.overlay.refresh_demand(session.camera_id, now).map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "overlay": true })))
}

/// `POST /live/{sid}/overlay/disable`.
pub async fn overlay_disable(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(session_id): Path<SessionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let mut session = owned_session(&state, &auth, session_id, now)?;
    session.overlay = false;
    state
        .live
        .session_store()
        .update_session(&session)
        .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))?;
    Ok(Json(serde_json::json!({ "overlay": false })))
}

/// `POST /live/events`.
pub async fn record_event(
    State(state): State<SharedState>,
    auth: AuthContext,
    Json(event): Json<TelemetryEvent>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = OffsetDateTime::now_utc();
    state.telemetry.record_event(&auth, &event, now).map_err(ApiError::from)?;
    // Sessions with the overlay on keep the demand registry fresh through
    // their positive signals.
    if event.event_type.is_positive_signal() {
        if let Ok(session) = owned_session(&state, &auth, event.session_id, now) {
            if session.overlay {
                let _ = state.overlay.refresh_demand(session.camera_id, now);
            }
        }
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /cameras/{id}/detections/latest?stream=basic|weapon`.
pub async fn latest_detection(
    State(state): State<SharedState>,
    auth: AuthContext,
    Path(camera_id): Path<CameraId>,
    Query(query): Query<DetectionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::http::camera_routes::require_camera(&state, &auth, camera_id, "live.view")?;
    let stream = DetectionStream::parse(&query.stream)
        .ok_or_else(|| ApiError::validation("stream", "stream must be basic or weapon"))?;
    let latest = state
        .overlay
        .latest_detection(auth.tenant_id, camera_id, stream, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    match latest {
        Some(detection) => Ok(Json(serde_json::to_value(detection).unwrap_or_default())),
        None => Ok(Json(serde_json::json!({ "objects": [], "age_ms": null }))),
    }
}
