// crates/vigil-store/src/nvrs.rs
// ============================================================================
// Module: NVR Repository
// Description: NVR, channel, link, and poll-state SQL.
// Purpose: Persist recorder inventory and the event poller's resume state.
// Dependencies: postgres, vigil-core
// ============================================================================

//! ## Overview
//! NVRs mirror the camera repository's soft-delete and uniqueness shape.
//! Channels keep a stable vendor `channel_ref` and track provisioning plus
//! validation independently; the poller's cursor state lives in its own row
//! keyed by NVR so poll cycles update it without touching inventory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::CameraId;
use vigil_core::CameraNvrLink;
use vigil_core::ChannelId;
use vigil_core::ChannelValidation;
use vigil_core::EventPollState;
use vigil_core::Nvr;
use vigil_core::NvrChannel;
use vigil_core::NvrId;
use vigil_core::NvrStatus;
use vigil_core::NvrVendor;
use vigil_core::ProvisioningState;
use vigil_core::RecordingMode;
use vigil_core::SiteId;
use vigil_core::TenantId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps an NVR row into its domain shape.
fn nvr_from_row(row: &Row) -> Result<Nvr, PgStoreError> {
    let ip_text: String = row.try_get("ip")?;
    let ip =
        ip_text.parse().map_err(|_| PgStoreError::Corrupt(format!("nvr ip {ip_text:?}")))?;
    let port: i32 = row.try_get("port")?;
    let vendor_text: String = row.try_get("vendor")?;
    let vendor = NvrVendor::parse(&vendor_text)
        .ok_or_else(|| PgStoreError::Corrupt(format!("nvr vendor {vendor_text:?}")))?;
    let status_text: String = row.try_get("status")?;
    let status = parse_status(&status_text)?;
    Ok(Nvr {
        id: NvrId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        site_id: SiteId::new(row.try_get::<_, Uuid>("site_id")?),
        display_name: row.try_get("display_name")?,
        vendor,
        ip,
        port: u16::try_from(port).map_err(|_| PgStoreError::Corrupt("nvr port".to_string()))?,
        status,
        last_status_at: row.try_get("last_status_at")?,
        enabled: row.try_get("enabled")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Parses a stored status label.
fn parse_status(value: &str) -> Result<NvrStatus, PgStoreError> {
    match value {
        "unknown" => Ok(NvrStatus::Unknown),
        "online" => Ok(NvrStatus::Online),
        "offline" => Ok(NvrStatus::Offline),
        "auth_failed" => Ok(NvrStatus::AuthFailed),
        "error" => Ok(NvrStatus::Error),
        other => Err(PgStoreError::Corrupt(format!("nvr status {other:?}"))),
    }
}

/// NVR columns shared by every select.
const NVR_COLUMNS: &str = "id, tenant_id, site_id, display_name, vendor, ip, port, status, \
                           last_status_at, enabled, deleted_at, created_at";

// ============================================================================
// SECTION: NVR CRUD
// ============================================================================

/// Parameters for creating an NVR.
#[derive(Debug, Clone)]
pub struct NewNvr {
    /// Owning site.
    pub site_id: SiteId,
    /// Display name.
    pub display_name: String,
    /// Device IP address.
    pub ip: std::net::IpAddr,
    /// Device port.
    pub port: u16,
    /// Vendor adapter.
    pub vendor: NvrVendor,
}

/// Inserts an NVR for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate `(ip, port)`.
pub fn create_nvr(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    new: &NewNvr,
    now: OffsetDateTime,
) -> Result<Nvr, PgStoreError> {
    let id = NvrId::generate();
    tx.execute(
        "INSERT INTO nvrs (id, tenant_id, site_id, display_name, vendor, ip, port, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &id.as_uuid(),
            &tenant_id.as_uuid(),
            &new.site_id.as_uuid(),
            &new.display_name,
            &new.vendor.as_str(),
            &new.ip.to_string(),
            &i32::from(new.port),
            &now,
        ],
    )?;
    Ok(Nvr {
        id,
        tenant_id,
        site_id: new.site_id,
        display_name: new.display_name.clone(),
        vendor: new.vendor,
        ip: new.ip,
        port: new.port,
        status: NvrStatus::Unknown,
        last_status_at: None,
        enabled: true,
        deleted_at: None,
        created_at: now,
    })
}

/// Loads a non-deleted NVR by id.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_nvr(tx: &mut Transaction<'_>, nvr_id: NvrId) -> Result<Option<Nvr>, PgStoreError> {
    let sql = format!("SELECT {NVR_COLUMNS} FROM nvrs WHERE id = $1 AND deleted_at IS NULL");
    let row = tx.query_opt(sql.as_str(), &[&nvr_id.as_uuid()])?;
    row.as_ref().map(nvr_from_row).transpose()
}

/// Lists non-deleted NVRs, optionally only enabled ones.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_nvrs(tx: &mut Transaction<'_>, enabled_only: bool) -> Result<Vec<Nvr>, PgStoreError> {
    let sql = format!(
        "SELECT {NVR_COLUMNS} FROM nvrs WHERE deleted_at IS NULL AND (NOT $1 OR enabled) \
         ORDER BY display_name, id"
    );
    let rows = tx.query(sql.as_str(), &[&enabled_only])?;
    rows.iter().map(nvr_from_row).collect()
}

/// Soft-deletes an NVR. Returns false when it was absent.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn soft_delete_nvr(
    tx: &mut Transaction<'_>,
    nvr_id: NvrId,
    now: OffsetDateTime,
) -> Result<bool, PgStoreError> {
    let updated = tx.execute(
        "UPDATE nvrs SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        &[&nvr_id.as_uuid(), &now],
    )?;
    Ok(updated > 0)
}

/// Records an NVR's observed status.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn set_nvr_status(
    tx: &mut Transaction<'_>,
    nvr_id: NvrId,
    status: NvrStatus,
    now: OffsetDateTime,
) -> Result<(), PgStoreError> {
    tx.execute(
        "UPDATE nvrs SET status = $2, last_status_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        &[&nvr_id.as_uuid(), &status.as_str(), &now],
    )?;
    Ok(())
}

/// Counts non-deleted NVRs for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn nvr_count(tx: &mut Transaction<'_>) -> Result<u32, PgStoreError> {
    let row = tx.query_one("SELECT count(*) FROM nvrs WHERE deleted_at IS NULL", &[])?;
    let count: i64 = row.try_get(0)?;
    u32::try_from(count).map_err(|_| PgStoreError::Corrupt("nvr count".to_string()))
}

// ============================================================================
// SECTION: Channels
// ============================================================================

/// Maps a channel row into its domain shape.
fn channel_from_row(row: &Row) -> Result<NvrChannel, PgStoreError> {
    let provisioning_text: String = row.try_get("provisioning")?;
    let provisioning = match provisioning_text.as_str() {
        "not_created" => ProvisioningState::NotCreated,
        "created" => ProvisioningState::Created,
        other => return Err(PgStoreError::Corrupt(format!("provisioning {other:?}"))),
    };
    let validation_text: String = row.try_get("validation")?;
    let validation = match validation_text.as_str() {
        "unknown" => ChannelValidation::Unknown,
        "ok" => ChannelValidation::Ok,
        "unauthorized" => ChannelValidation::Unauthorized,
        "timeout" => ChannelValidation::Timeout,
        "error" => ChannelValidation::Error,
        other => return Err(PgStoreError::Corrupt(format!("validation {other:?}"))),
    };
    Ok(NvrChannel {
        id: ChannelId::new(row.try_get::<_, Uuid>("id")?),
        nvr_id: NvrId::new(row.try_get::<_, Uuid>("nvr_id")?),
        channel_ref: row.try_get("channel_ref")?,
        name: row.try_get("name")?,
        provisioning,
        validation,
        camera_id: row.try_get::<_, Option<Uuid>>("camera_id")?.map(CameraId::new),
    })
}

/// Upserts discovered channels by `(nvr, channel_ref)`, keeping existing
/// provisioning state.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails.
pub fn upsert_channels(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    nvr_id: NvrId,
    channels: &[(String, String)],
) -> Result<Vec<NvrChannel>, PgStoreError> {
    for (channel_ref, name) in channels {
        tx.execute(
            "INSERT INTO nvr_channels (id, tenant_id, nvr_id, channel_ref, name) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (nvr_id, channel_ref) DO UPDATE SET name = $5",
            &[
                &ChannelId::generate().as_uuid(),
                &tenant_id.as_uuid(),
                &nvr_id.as_uuid(),
                channel_ref,
                name,
            ],
        )?;
    }
    list_channels(tx, nvr_id)
}

/// Lists an NVR's channels.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_channels(
    tx: &mut Transaction<'_>,
    nvr_id: NvrId,
) -> Result<Vec<NvrChannel>, PgStoreError> {
    let rows = tx.query(
        "SELECT id, nvr_id, channel_ref, name, provisioning, validation, camera_id \
         FROM nvr_channels WHERE nvr_id = $1 ORDER BY channel_ref",
        &[&nvr_id.as_uuid()],
    )?;
    rows.iter().map(channel_from_row).collect()
}

/// Records a channel's validation outcome.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn set_channel_validation(
    tx: &mut Transaction<'_>,
    channel_id: ChannelId,
    validation: ChannelValidation,
) -> Result<(), PgStoreError> {
    let label = match validation {
        ChannelValidation::Unknown => "unknown",
        ChannelValidation::Ok => "ok",
        ChannelValidation::Unauthorized => "unauthorized",
        ChannelValidation::Timeout => "timeout",
        ChannelValidation::Error => "error",
    };
    tx.execute(
        "UPDATE nvr_channels SET validation = $2 WHERE id = $1",
        &[&channel_id.as_uuid(), &label],
    )?;
    Ok(())
}

/// Marks a channel provisioned, linking its created camera.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn mark_channel_provisioned(
    tx: &mut Transaction<'_>,
    channel_id: ChannelId,
    camera_id: CameraId,
) -> Result<(), PgStoreError> {
    tx.execute(
        "UPDATE nvr_channels SET provisioning = 'created', camera_id = $2 WHERE id = $1",
        &[&channel_id.as_uuid(), &camera_id.as_uuid()],
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Camera Links
// ============================================================================

/// Upserts the link binding a camera to its backing NVR channel.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn upsert_camera_link(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    link: &CameraNvrLink,
) -> Result<(), PgStoreError> {
    let mode = match link.recording_mode {
        RecordingMode::Vms => "vms",
        RecordingMode::Nvr => "nvr",
    };
    tx.execute(
        "INSERT INTO camera_nvr_links (tenant_id, camera_id, nvr_id, channel_ref, \
         recording_mode) VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (camera_id) DO UPDATE SET nvr_id = $3, channel_ref = $4, \
         recording_mode = $5",
        &[
            &tenant_id.as_uuid(),
            &link.camera_id.as_uuid(),
            &link.nvr_id.as_uuid(),
            &link.channel_ref,
            &mode,
        ],
    )?;
    Ok(())
}

/// Lists camera links for an NVR, mapping channel refs to cameras.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn links_for_nvr(
    tx: &mut Transaction<'_>,
    nvr_id: NvrId,
) -> Result<Vec<CameraNvrLink>, PgStoreError> {
    let rows = tx.query(
        "SELECT camera_id, nvr_id, channel_ref, recording_mode FROM camera_nvr_links \
         WHERE nvr_id = $1",
        &[&nvr_id.as_uuid()],
    )?;
    rows.iter()
        .map(|row| {
            let mode_text: String = row.try_get("recording_mode")?;
            let recording_mode = match mode_text.as_str() {
                "vms" => RecordingMode::Vms,
                "nvr" => RecordingMode::Nvr,
                other => return Err(PgStoreError::Corrupt(format!("recording mode {other:?}"))),
            };
            Ok(CameraNvrLink {
                camera_id: CameraId::new(row.try_get::<_, Uuid>("camera_id")?),
                nvr_id: NvrId::new(row.try_get::<_, Uuid>("nvr_id")?),
                channel_ref: row.try_get("channel_ref")?,
                recording_mode,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Poll State
// ============================================================================

/// Loads the poll state for an NVR, defaulting to an empty cursor.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_poll_state(
    tx: &mut Transaction<'_>,
    nvr_id: NvrId,
) -> Result<EventPollState, PgStoreError> {
    let row = tx.query_opt(
        "SELECT nvr_id, poll_cursor, since, last_success_at, consecutive_failures, \
         last_error_code FROM event_poll_state WHERE nvr_id = $1",
        &[&nvr_id.as_uuid()],
    )?;
    let Some(row) = row else {
        return Ok(EventPollState {
            nvr_id,
            cursor: None,
            since: None,
            last_success_at: None,
            consecutive_failures: 0,
            last_error_code: None,
        });
    };
    let failures: i32 = row.try_get("consecutive_failures")?;
    Ok(EventPollState {
        nvr_id: NvrId::new(row.try_get::<_, Uuid>("nvr_id")?),
        cursor: row.try_get("poll_cursor")?,
        since: row.try_get("since")?,
        last_success_at: row.try_get("last_success_at")?,
        consecutive_failures: u32::try_from(failures)
            .map_err(|_| PgStoreError::Corrupt("consecutive_failures".to_string()))?,
        last_error_code: row.try_get("last_error_code")?,
    })
}

/// Records a successful poll: the new cursor and success timestamp.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn record_poll_success(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    nvr_id: NvrId,
    cursor: Option<&str>,
    now: OffsetDateTime,
) -> Result<(), PgStoreError> {
    tx.execute(
        "INSERT INTO event_poll_state (tenant_id, nvr_id, poll_cursor, last_success_at, \
         consecutive_failures) VALUES ($1, $2, $3, $4, 0) \
         ON CONFLICT (nvr_id) DO UPDATE SET poll_cursor = $3, last_success_at = $4, \
         consecutive_failures = 0, last_error_code = NULL",
        &[&tenant_id.as_uuid(), &nvr_id.as_uuid(), &cursor, &now],
    )?;
    Ok(())
}

/// Records a failed poll: bumps the failure counter and stores the code.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn record_poll_failure(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    nvr_id: NvrId,
    error_code: &str,
) -> Result<u32, PgStoreError> {
    let row = tx.query_one(
        "INSERT INTO event_poll_state (tenant_id, nvr_id, consecutive_failures, \
         last_error_code) VALUES ($1, $2, 1, $3) \
         ON CONFLICT (nvr_id) DO UPDATE SET \
         consecutive_failures = event_poll_state.consecutive_failures + 1, \
         last_error_code = $3 \
         RETURNING consecutive_failures",
        &[&tenant_id.as_uuid(), &nvr_id.as_uuid(), &error_code],
    )?;
    let failures: i32 = row.try_get(0)?;
    u32::try_from(failures).map_err(|_| PgStoreError::Corrupt("consecutive_failures".to_string()))
}
