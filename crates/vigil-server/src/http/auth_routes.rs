// crates/vigil-server/src/http/auth_routes.rs
// ============================================================================
// Module: Auth Routes
// Description: Login, refresh, logout, and reset completion handlers.
// Purpose: Expose the identity flows with fail-closed semantics.
// Dependencies: axum, vigil-core
// ============================================================================

//! ## Overview
//! The auth surface never discloses which part of a credential failed and
//! maps every backing-store outage to 503: an unauthenticated caller must
//! not learn anything from a degraded deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::auth::TokenPair;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    /// Tenant name.
    pub tenant: String,
    /// Login email.
    pub email: String,
    /// Password.
    pub password: String,
}

/// Refresh/logout request body.
#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    /// Opaque refresh token.
    pub refresh_token: String,
}

/// Reset completion request body.
#[derive(Debug, Deserialize)]
pub struct CompleteResetBody {
    /// Opaque reset token.
    pub reset_token: String,
    /// Replacement password.
    pub new_password: String,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /auth/login`.
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .auth
        .login(&body.tenant, &body.email, &body.password, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(pair))
}

/// `POST /auth/refresh`.
pub async fn refresh(
    State(state): State<SharedState>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .auth
        .refresh(&body.refresh_token, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(pair))
}

/// `POST /auth/logout`.
pub async fn logout(
    State(state): State<SharedState>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .auth
        .logout(&body.refresh_token, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /auth/complete-reset`.
pub async fn complete_reset(
    State(state): State<SharedState>,
    Json(body): Json<CompleteResetBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .auth
        .complete_reset(&body.reset_token, &body.new_password, OffsetDateTime::now_utc())
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
