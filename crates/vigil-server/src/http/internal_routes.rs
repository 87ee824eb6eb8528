// crates/vigil-server/src/http/internal_routes.rs
// ============================================================================
// Module: Internal Routes
// Description: Service-token endpoints for the AI and media collaborators.
// Purpose: Feed the AI fan-out and accept its detections; proxy snapshots.
// Dependencies: axum, vigil-core
// ============================================================================

//! ## Overview
//! Internal endpoints authenticate with the configured service token, not a
//! user JWT. The AI collaborator polls the active-camera slice, posts
//! detections per camera stream, and the deployment's tooling pulls
//! snapshots through the media plane.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use time::OffsetDateTime;

use vigil_core::CameraId;
use vigil_core::DetectionPayload;
use vigil_core::DetectionStream;
use vigil_core::TenantId;

use crate::errors::ApiError;
use crate::http::require_service_token;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Detection post query.
#[derive(Debug, Deserialize)]
pub struct DetectionPostQuery {
    /// Stream label.
    pub stream: String,
    /// Tenant the camera belongs to.
    pub tenant_id: TenantId,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /internal/cameras/active`: the overlay demand slice for the AI.
pub async fn active_cameras(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CameraId>>, ApiError> {
    require_service_token(&state, &headers)?;
    let cameras =
        state.overlay.active_cameras(OffsetDateTime::now_utc()).map_err(ApiError::from)?;
    Ok(Json(cameras))
}

/// `GET /internal/cameras/{id}/snapshot`: JPEG snapshot via the media plane.
pub async fn snapshot(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(camera_id): Path<CameraId>,
) -> Result<Response, ApiError> {
    require_service_token(&state, &headers)?;
    let media = Arc::clone(&state.media);
    let bytes = tokio::task::spawn_blocking(move || media.capture_snapshot(camera_id))
        .await
        .map_err(|_| ApiError::from(vigil_core::DomainError::internal("snapshot task failed")))?
        .map_err(|err| {
            ApiError::new(err.core_kind(), "media_snapshot", err.to_string())
        })?;
    Ok(([(axum::http::header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

/// `POST /internal/cameras/{id}/detections?stream=&tenant_id=`: AI writes
/// the latest detection for a camera stream.
pub async fn put_detection(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(camera_id): Path<CameraId>,
    Query(query): Query<DetectionPostQuery>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_service_token(&state, &headers)?;
    let stream = DetectionStream::parse(&query.stream)
        .ok_or_else(|| ApiError::validation("stream", "stream must be basic or weapon"))?;
    let payload: DetectionPayload = serde_json::from_slice(&body)
        .map_err(|err| ApiError::validation("payload", err.to_string()))?;
    state
        .overlay
        .put_detection(
            query.tenant_id,
            camera_id,
            stream,
            &payload,
            body.len(),
            OffsetDateTime::now_utc(),
        )
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
