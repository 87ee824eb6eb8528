// crates/vigil-server/src/http/license_routes.rs
// ============================================================================
// Module: License Routes
// Description: License status and manual reload handlers.
// Purpose: Expose the license lifecycle to operators.
// Dependencies: axum, vigil-core
// ============================================================================

//! License status and reload handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use time::OffsetDateTime;
use vigil_core::CheckTarget;
use vigil_core::LicenseState;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Responses
// ============================================================================

/// License status response.
#[derive(Debug, Serialize)]
pub struct LicenseStatusBody {
    /// Evaluated state with its embedded detail.
    #[serde(flatten)]
    pub state: LicenseState,
    /// License id when a payload is loaded.
    pub license_id: Option<String>,
    /// Customer name when a payload is loaded.
    pub customer_name: Option<String>,
    /// Capacity limits when a payload is loaded.
    pub limits: Option<vigil_core::LicenseLimits>,
    /// When the snapshot was evaluated.
    #[serde(with = "time::serde::rfc3339")]
    pub evaluated_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /license/status`.
pub async fn status(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<LicenseStatusBody>, ApiError> {
    state.rbac.require(&auth, "license.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let snapshot = state.license.status();
    Ok(Json(LicenseStatusBody {
        state: snapshot.state,
        license_id: snapshot.payload.as_ref().map(|payload| payload.license_id.clone()),
        customer_name: snapshot.payload.as_ref().map(|payload| payload.customer_name.clone()),
        limits: snapshot.payload.as_ref().map(|payload| payload.limits),
        evaluated_at: snapshot.evaluated_at,
    }))
}

/// `POST /license/reload`.
pub async fn reload(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rbac.require(&auth, "license.manage", CheckTarget::Tenant).map_err(ApiError::from)?;
    let reloaded = state.license.reload(OffsetDateTime::now_utc());
    Ok(Json(serde_json::json!({ "state": reloaded.as_str() })))
}
