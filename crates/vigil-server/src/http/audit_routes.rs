// crates/vigil-server/src/http/audit_routes.rs
// ============================================================================
// Module: Audit Routes
// Description: Tenant-scoped audit query and NDJSON export handlers.
// Purpose: Page the append-only log and stream bounded exports.
// Dependencies: axum, vigil-core, vigil-store
// ============================================================================

//! Audit query and export handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde::Serialize;
use vigil_core::AuditEvent;
use vigil_core::CheckTarget;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Query parameters for audit paging.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Opaque continuation cursor.
    pub cursor: Option<String>,
    /// Page size.
    pub limit: Option<i64>,
}

/// One page of audit events.
#[derive(Debug, Serialize)]
pub struct AuditPageBody {
    /// Events, newest first.
    pub events: Vec<AuditEvent>,
    /// Continuation cursor when more pages exist.
    pub next_cursor: Option<String>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /audit/events`.
pub async fn query(
    State(state): State<SharedState>,
    auth: AuthContext,
    Query(params): Query<AuditQuery>,
) -> Result<Json<AuditPageBody>, ApiError> {
    state.rbac.require(&auth, "audit.view", CheckTarget::Tenant).map_err(ApiError::from)?;
    let store = Arc::clone(&state.store);
    let tenant_id = auth.tenant_id;
    let page = tokio::task::spawn_blocking(move || {
        store.with_tenant(tenant_id, |tx| {
            vigil_store::audit::query_events(
                tx,
                params.cursor.as_deref(),
                params.limit.unwrap_or(100),
            )
        })
    })
    .await
    .map_err(|_| ApiError::from(vigil_core::DomainError::internal("query task failed")))?
    .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))?;
    Ok(Json(AuditPageBody {
        events: page.events,
        next_cursor: page.next_cursor,
    }))
}

/// `POST /audit/exports`: streams newline-delimited JSON, capped at the
/// export record limit.
pub async fn export(
    State(state): State<SharedState>,
    auth: AuthContext,
) -> Result<Response, ApiError> {
    state.rbac.require(&auth, "audit.export", CheckTarget::Tenant).map_err(ApiError::from)?;
    let store = Arc::clone(&state.store);
    let tenant_id = auth.tenant_id;
    let body = tokio::task::spawn_blocking(move || {
        store.with_tenant(tenant_id, |tx| {
            let mut lines = String::new();
            vigil_store::audit::export_events(tx, |event| {
                let line = serde_json::to_string(event).map_err(|err| {
                    vigil_store::PgStoreError::Corrupt(err.to_string())
                })?;
                lines.push_str(&line);
                lines.push('\n');
                Ok(())
            })?;
            Ok(lines)
        })
    })
    .await
    .map_err(|_| ApiError::from(vigil_core::DomainError::internal("export task failed")))?
    .map_err(|err| ApiError::from(vigil_core::DomainError::from(err)))?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}
