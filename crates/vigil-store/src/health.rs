// crates/vigil-store/src/health.rs
// ============================================================================
// Module: Health Repository
// Description: Camera health snapshots, bounded history, and alerts.
// Purpose: Persist probe outcomes and the alert lifecycle.
// Dependencies: postgres, vigil-core
// ============================================================================

//! ## Overview
//! Health has two persistence shapes: a current-status row per camera,
//! upserted on every probe, and an append-only history bounded to the most
//! recent [`vigil_core::HEALTH_HISTORY_CAP`] entries by post-insert pruning.
//! Alerts are unique per `(camera, kind)` while open; closing is the only
//! mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::Alert;
use vigil_core::AlertId;
use vigil_core::CameraHealth;
use vigil_core::CameraHealthStatus;
use vigil_core::CameraId;
use vigil_core::HEALTH_HISTORY_CAP;
use vigil_core::HealthHistoryEntry;
use vigil_core::TenantId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Parses a stored camera health status label.
fn parse_status(value: &str) -> Result<CameraHealthStatus, PgStoreError> {
    match value {
        "online" => Ok(CameraHealthStatus::Online),
        "offline" => Ok(CameraHealthStatus::Offline),
        "auth_failed" => Ok(CameraHealthStatus::AuthFailed),
        "stream_error" => Ok(CameraHealthStatus::StreamError),
        other => Err(PgStoreError::Corrupt(format!("health status {other:?}"))),
    }
}

/// Maps a health row into its domain shape.
fn health_from_row(row: &Row) -> Result<CameraHealth, PgStoreError> {
    let status_text: String = row.try_get("status")?;
    let failures: i32 = row.try_get("consecutive_failures")?;
    Ok(CameraHealth {
        camera_id: CameraId::new(row.try_get::<_, Uuid>("camera_id")?),
        status: parse_status(&status_text)?,
        last_checked_at: row.try_get("last_checked_at")?,
        last_success_at: row.try_get("last_success_at")?,
        consecutive_failures: u32::try_from(failures.max(0)).unwrap_or(0),
        last_error_code: row.try_get("last_error_code")?,
    })
}

// ============================================================================
// SECTION: Current Health
// ============================================================================

/// Upserts a camera's current health from a probe outcome.
///
/// On success the failure counter resets and `last_success_at` updates; on
/// failure the counter increments and the error code is recorded.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn record_probe(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    camera_id: CameraId,
    status: CameraHealthStatus,
    error_code: Option<&str>,
    now: OffsetDateTime,
) -> Result<CameraHealth, PgStoreError> {
    let success = status == CameraHealthStatus::Online;
    let row = tx.query_one(
        "INSERT INTO camera_health (tenant_id, camera_id, status, last_checked_at, \
         last_success_at, consecutive_failures, last_error_code) \
         VALUES ($1, $2, $3, $4, CASE WHEN $5 THEN $4 ELSE NULL END, \
         CASE WHEN $5 THEN 0 ELSE 1 END, $6) \
         ON CONFLICT (camera_id) DO UPDATE SET status = $3, last_checked_at = $4, \
         last_success_at = CASE WHEN $5 THEN $4 ELSE camera_health.last_success_at END, \
         consecutive_failures = CASE WHEN $5 THEN 0 \
             ELSE camera_health.consecutive_failures + 1 END, \
         last_error_code = $6 \
         RETURNING camera_id, status, last_checked_at, last_success_at, \
         consecutive_failures, last_error_code",
        &[&tenant_id.as_uuid(), &camera_id.as_uuid(), &status.as_str(), &now, &success, &error_code],
    )?;
    health_from_row(&row)
}

/// Loads a camera's current health.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_health(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
) -> Result<Option<CameraHealth>, PgStoreError> {
    let row = tx.query_opt(
        "SELECT camera_id, status, last_checked_at, last_success_at, consecutive_failures, \
         last_error_code FROM camera_health WHERE camera_id = $1",
        &[&camera_id.as_uuid()],
    )?;
    row.as_ref().map(health_from_row).transpose()
}

/// Lists current health for every camera of the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_health(tx: &mut Transaction<'_>) -> Result<Vec<CameraHealth>, PgStoreError> {
    let rows = tx.query(
        "SELECT camera_id, status, last_checked_at, last_success_at, consecutive_failures, \
         last_error_code FROM camera_health ORDER BY camera_id",
        &[],
    )?;
    rows.iter().map(health_from_row).collect()
}

// ============================================================================
// SECTION: History
// ============================================================================

/// Appends a history entry and prunes beyond the per-camera cap.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails.
pub fn append_history(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    camera_id: CameraId,
    entry: &HealthHistoryEntry,
) -> Result<(), PgStoreError> {
    let rtt = entry
        .rtt_ms
        .map(i32::try_from)
        .transpose()
        .map_err(|_| PgStoreError::Corrupt("rtt_ms".to_string()))?;
    tx.execute(
        "INSERT INTO camera_health_history (tenant_id, camera_id, at, status, reason, rtt_ms) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        &[
            &tenant_id.as_uuid(),
            &camera_id.as_uuid(),
            &entry.at,
            &entry.status.as_str(),
            &entry.reason,
            &rtt,
        ],
    )?;
    // Keep only the newest HEALTH_HISTORY_CAP rows for this camera.
    tx.execute(
        "DELETE FROM camera_health_history WHERE camera_id = $1 AND id NOT IN ( \
             SELECT id FROM camera_health_history WHERE camera_id = $1 \
             ORDER BY at DESC, id DESC LIMIT $2)",
        &[&camera_id.as_uuid(), &(i64::try_from(HEALTH_HISTORY_CAP).unwrap_or(200))],
    )?;
    Ok(())
}

/// Lists a camera's history, newest first.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_history(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
    limit: i64,
) -> Result<Vec<HealthHistoryEntry>, PgStoreError> {
    let limit = limit.clamp(1, i64::try_from(HEALTH_HISTORY_CAP).unwrap_or(200));
    let rows = tx.query(
        "SELECT at, status, reason, rtt_ms FROM camera_health_history \
         WHERE camera_id = $1 ORDER BY at DESC, id DESC LIMIT $2",
        &[&camera_id.as_uuid(), &limit],
    )?;
    rows.iter()
        .map(|row| {
            let status_text: String = row.try_get("status")?;
            let rtt: Option<i32> = row.try_get("rtt_ms")?;
            Ok(HealthHistoryEntry {
                at: row.try_get("at")?,
                status: parse_status(&status_text)?,
                reason: row.try_get("reason")?,
                rtt_ms: rtt
                    .map(u32::try_from)
                    .transpose()
                    .map_err(|_| PgStoreError::Corrupt("rtt_ms".to_string()))?,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Alerts
// ============================================================================

/// Maps an alert row into its domain shape.
fn alert_from_row(row: &Row) -> Result<Alert, PgStoreError> {
    Ok(Alert {
        id: AlertId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        camera_id: CameraId::new(row.try_get::<_, Uuid>("camera_id")?),
        kind: row.try_get("kind")?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        last_notified_at: row.try_get("last_notified_at")?,
    })
}

/// Opens an alert unless one of the kind is already open for the camera.
/// Returns the open alert either way.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails.
pub fn open_alert(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    camera_id: CameraId,
    kind: &str,
    now: OffsetDateTime,
) -> Result<Alert, PgStoreError> {
    tx.execute(
        "INSERT INTO alerts (id, tenant_id, camera_id, kind, opened_at) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
        &[
            &AlertId::generate().as_uuid(),
            &tenant_id.as_uuid(),
            &camera_id.as_uuid(),
            &kind,
            &now,
        ],
    )?;
    let row = tx.query_one(
        "SELECT id, tenant_id, camera_id, kind, opened_at, closed_at, last_notified_at \
         FROM alerts WHERE camera_id = $1 AND kind = $2 AND closed_at IS NULL",
        &[&camera_id.as_uuid(), &kind],
    )?;
    alert_from_row(&row)
}

/// Closes any open alert of the kind for the camera. Returns whether one
/// was open.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn close_alert(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
    kind: &str,
    now: OffsetDateTime,
) -> Result<bool, PgStoreError> {
    let updated = tx.execute(
        "UPDATE alerts SET closed_at = $3 WHERE camera_id = $1 AND kind = $2 \
         AND closed_at IS NULL",
        &[&camera_id.as_uuid(), &kind, &now],
    )?;
    Ok(updated > 0)
}

/// Lists alerts for the bound tenant, optionally only open ones.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_alerts(tx: &mut Transaction<'_>, open_only: bool) -> Result<Vec<Alert>, PgStoreError> {
    let rows = tx.query(
        "SELECT id, tenant_id, camera_id, kind, opened_at, closed_at, last_notified_at \
         FROM alerts WHERE (NOT $1 OR closed_at IS NULL) ORDER BY opened_at DESC",
        &[&open_only],
    )?;
    rows.iter().map(alert_from_row).collect()
}

/// Records that a notification was sent for an alert.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn mark_alert_notified(
    tx: &mut Transaction<'_>,
    alert_id: AlertId,
    now: OffsetDateTime,
) -> Result<(), PgStoreError> {
    tx.execute(
        "UPDATE alerts SET last_notified_at = $2 WHERE id = $1",
        &[&alert_id.as_uuid(), &now],
    )?;
    Ok(())
}
