// crates/vigil-store/src/discovery.rs
// ============================================================================
// Module: Discovery Repository
// Description: Discovery run and discovered-device SQL.
// Purpose: Persist async discovery jobs and their per-run device upserts.
// Dependencies: postgres, serde_json, vigil-core
// ============================================================================

//! ## Overview
//! Discovery runs own their devices as a pure tree: devices are upserted by
//! `(run, ip)` while the scan progresses, and the run row accumulates device
//! and error counts until a terminal status is recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::DeviceId;
use vigil_core::DiscoveredDevice;
use vigil_core::DiscoveryRun;
use vigil_core::DiscoveryRunId;
use vigil_core::DiscoveryRunStatus;
use vigil_core::SiteId;
use vigil_core::TenantId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Parses a stored run status label.
fn parse_run_status(value: &str) -> Result<DiscoveryRunStatus, PgStoreError> {
    match value {
        "running" => Ok(DiscoveryRunStatus::Running),
        "completed" => Ok(DiscoveryRunStatus::Completed),
        "partially_completed" => Ok(DiscoveryRunStatus::PartiallyCompleted),
        "failed" => Ok(DiscoveryRunStatus::Failed),
        other => Err(PgStoreError::Corrupt(format!("run status {other:?}"))),
    }
}

/// Renders a run status label.
const fn run_status_label(status: DiscoveryRunStatus) -> &'static str {
    match status {
        DiscoveryRunStatus::Running => "running",
        DiscoveryRunStatus::Completed => "completed",
        DiscoveryRunStatus::PartiallyCompleted => "partially_completed",
        DiscoveryRunStatus::Failed => "failed",
    }
}

/// Maps a run row into its domain shape.
fn run_from_row(row: &Row) -> Result<DiscoveryRun, PgStoreError> {
    let status_text: String = row.try_get("status")?;
    let device_count: i32 = row.try_get("device_count")?;
    let error_count: i32 = row.try_get("error_count")?;
    Ok(DiscoveryRun {
        id: DiscoveryRunId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        site_id: row.try_get::<_, Option<Uuid>>("site_id")?.map(SiteId::new),
        status: parse_run_status(&status_text)?,
        device_count: u32::try_from(device_count.max(0)).unwrap_or(0),
        error_count: u32::try_from(error_count.max(0)).unwrap_or(0),
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

/// Maps a device row into its domain shape.
fn device_from_row(row: &Row) -> Result<DiscoveredDevice, PgStoreError> {
    let ip_text: String = row.try_get("ip")?;
    let ip =
        ip_text.parse().map_err(|_| PgStoreError::Corrupt(format!("device ip {ip_text:?}")))?;
    let xaddrs: Value = row.try_get("xaddrs")?;
    let xaddrs = xaddrs
        .as_array()
        .map(|entries| {
            entries.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(DiscoveredDevice {
        id: DeviceId::new(row.try_get::<_, Uuid>("id")?),
        run_id: DiscoveryRunId::new(row.try_get::<_, Uuid>("run_id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        ip,
        xaddrs,
        profile_s: row.try_get("profile_s")?,
        profile_t: row.try_get("profile_t")?,
        profile_g: row.try_get("profile_g")?,
        capabilities: row.try_get("capabilities")?,
        media_profiles: row.try_get("media_profiles")?,
        rtsp_uris: row.try_get("rtsp_uris")?,
        last_error_code: row.try_get("last_error_code")?,
    })
}

/// Device columns shared by every select.
const DEVICE_COLUMNS: &str = "id, tenant_id, run_id, ip, xaddrs, profile_s, profile_t, \
                              profile_g, capabilities, media_profiles, rtsp_uris, \
                              last_error_code";

// ============================================================================
// SECTION: Runs
// ============================================================================

/// Inserts a running discovery job and returns it.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn create_run(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    site_id: Option<SiteId>,
    now: OffsetDateTime,
) -> Result<DiscoveryRun, PgStoreError> {
    let id = DiscoveryRunId::generate();
    tx.execute(
        "INSERT INTO discovery_runs (id, tenant_id, site_id, started_at) \
         VALUES ($1, $2, $3, $4)",
        &[&id.as_uuid(), &tenant_id.as_uuid(), &site_id.map(|id| id.as_uuid()), &now],
    )?;
    Ok(DiscoveryRun {
        id,
        tenant_id,
        site_id,
        status: DiscoveryRunStatus::Running,
        device_count: 0,
        error_count: 0,
        started_at: now,
        finished_at: None,
    })
}

/// Loads a run by id.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_run(
    tx: &mut Transaction<'_>,
    run_id: DiscoveryRunId,
) -> Result<Option<DiscoveryRun>, PgStoreError> {
    let row = tx.query_opt(
        "SELECT id, tenant_id, site_id, status, device_count, error_count, started_at, \
         finished_at FROM discovery_runs WHERE id = $1",
        &[&run_id.as_uuid()],
    )?;
    row.as_ref().map(run_from_row).transpose()
}

/// Records a run's terminal status and final counts.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn finish_run(
    tx: &mut Transaction<'_>,
    run_id: DiscoveryRunId,
    status: DiscoveryRunStatus,
    device_count: u32,
    error_count: u32,
    now: OffsetDateTime,
) -> Result<(), PgStoreError> {
    tx.execute(
        "UPDATE discovery_runs SET status = $2, device_count = $3, error_count = $4, \
         finished_at = $5 WHERE id = $1",
        &[
            &run_id.as_uuid(),
            &run_status_label(status),
            &i32::try_from(device_count).unwrap_or(i32::MAX),
            &i32::try_from(error_count).unwrap_or(i32::MAX),
            &now,
        ],
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Devices
// ============================================================================

/// Upserts a discovered device by `(run, ip)`.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn upsert_device(
    tx: &mut Transaction<'_>,
    device: &DiscoveredDevice,
) -> Result<(), PgStoreError> {
    let xaddrs = Value::Array(device.xaddrs.iter().cloned().map(Value::String).collect());
    tx.execute(
        "INSERT INTO discovered_devices (id, tenant_id, run_id, ip, xaddrs, profile_s, \
         profile_t, profile_g, capabilities, media_profiles, rtsp_uris, last_error_code) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (run_id, ip) DO UPDATE SET xaddrs = $5, profile_s = $6, profile_t = $7, \
         profile_g = $8, capabilities = $9, media_profiles = $10, rtsp_uris = $11, \
         last_error_code = $12",
        &[
            &device.id.as_uuid(),
            &device.tenant_id.as_uuid(),
            &device.run_id.as_uuid(),
            &device.ip.to_string(),
            &xaddrs,
            &device.profile_s,
            &device.profile_t,
            &device.profile_g,
            &device.capabilities,
            &device.media_profiles,
            &device.rtsp_uris,
            &device.last_error_code,
        ],
    )?;
    Ok(())
}

/// Loads a discovered device by id.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_device(
    tx: &mut Transaction<'_>,
    device_id: DeviceId,
) -> Result<Option<DiscoveredDevice>, PgStoreError> {
    let sql = format!("SELECT {DEVICE_COLUMNS} FROM discovered_devices WHERE id = $1");
    let row = tx.query_opt(sql.as_str(), &[&device_id.as_uuid()])?;
    row.as_ref().map(device_from_row).transpose()
}

/// Lists discovered devices, optionally for one run.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_devices(
    tx: &mut Transaction<'_>,
    run_id: Option<DiscoveryRunId>,
) -> Result<Vec<DiscoveredDevice>, PgStoreError> {
    let sql = format!(
        "SELECT {DEVICE_COLUMNS} FROM discovered_devices \
         WHERE ($1::uuid IS NULL OR run_id = $1) ORDER BY ip"
    );
    let rows = tx.query(sql.as_str(), &[&run_id.map(|id| id.as_uuid())])?;
    rows.iter().map(device_from_row).collect()
}
