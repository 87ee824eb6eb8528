// crates/vigil-store/src/cameras.rs
// ============================================================================
// Module: Camera Repository
// Description: Camera, group, media-profile, and stream-selection SQL.
// Purpose: Persist the camera inventory inside tenant-bound transactions.
// Dependencies: postgres, vigil-core
// ============================================================================

//! ## Overview
//! All functions take a tenant-bound [`Transaction`]; the RLS policies scope
//! every statement to the bound tenant. Soft deletes set `deleted_at`, and
//! reads exclude deleted rows. The partial unique index on
//! `(tenant, site, ip, port)` turns duplicate endpoints into conflicts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::Camera;
use vigil_core::CameraGroup;
use vigil_core::CameraId;
use vigil_core::GroupId;
use vigil_core::MediaProfile;
use vigil_core::NewCamera;
use vigil_core::SiteId;
use vigil_core::StreamSelection;
use vigil_core::TenantId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a camera row into its domain shape.
fn camera_from_row(row: &Row) -> Result<Camera, PgStoreError> {
    let ip_text: String = row.try_get("ip")?;
    let ip = ip_text
        .parse()
        .map_err(|_| PgStoreError::Corrupt(format!("camera ip {ip_text:?}")))?;
    let port: i32 = row.try_get("port")?;
    let port = u16::try_from(port)
        .map_err(|_| PgStoreError::Corrupt(format!("camera port {port}")))?;
    let tags: Vec<String> = row.try_get("tags")?;
    Ok(Camera {
        id: CameraId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        site_id: SiteId::new(row.try_get::<_, Uuid>("site_id")?),
        display_name: row.try_get("display_name")?,
        ip,
        port,
        manufacturer: row.try_get("manufacturer")?,
        model: row.try_get("model")?,
        serial: row.try_get("serial")?,
        mac: row.try_get("mac")?,
        tags: tags.into_iter().collect(),
        enabled: row.try_get("enabled")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Camera columns shared by every select.
const CAMERA_COLUMNS: &str = "id, tenant_id, site_id, display_name, ip, port, manufacturer, \
                              model, serial, mac, tags, enabled, deleted_at, created_at, \
                              updated_at";

// ============================================================================
// SECTION: Camera CRUD
// ============================================================================

/// Inserts a camera for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate `(site, ip, port)`.
pub fn create_camera(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    new: &NewCamera,
    now: OffsetDateTime,
) -> Result<Camera, PgStoreError> {
    let id = CameraId::generate();
    let tags: Vec<String> = new.tags.iter().cloned().collect();
    let camera = Camera {
        id,
        tenant_id,
        site_id: new.site_id,
        display_name: new.display_name.clone(),
        ip: new.ip,
        port: new.port,
        manufacturer: new.manufacturer.clone(),
        model: new.model.clone(),
        serial: new.serial.clone(),
        mac: new.mac.clone(),
        tags: new.tags.clone(),
        enabled: true,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    tx.execute(
        "INSERT INTO cameras (id, tenant_id, site_id, display_name, ip, port, manufacturer, \
         model, serial, mac, tags, enabled, search_text, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, true, $12, $13, $13)",
        &[
            &id.as_uuid(),
            &tenant_id.as_uuid(),
            &new.site_id.as_uuid(),
            &new.display_name,
            &new.ip.to_string(),
            &i32::from(new.port),
            &new.manufacturer,
            &new.model,
            &new.serial,
            &new.mac,
            &tags,
            &camera.search_text(),
            &now,
        ],
    )?;
    Ok(camera)
}

/// Loads a non-deleted camera by id.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_camera(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
) -> Result<Option<Camera>, PgStoreError> {
    let sql = format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = $1 AND deleted_at IS NULL");
    let row = tx.query_opt(sql.as_str(), &[&camera_id.as_uuid()])?;
    row.as_ref().map(camera_from_row).transpose()
}

/// Filter for camera listing.
#[derive(Debug, Clone, Default)]
pub struct CameraFilter {
    /// Restrict to one site.
    pub site_id: Option<SiteId>,
    /// Trigram search over the derived search text.
    pub search: Option<String>,
    /// Only enabled cameras.
    pub enabled_only: bool,
    /// Page size; defaults to 100, capped at 500.
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

/// Lists non-deleted cameras for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_cameras(
    tx: &mut Transaction<'_>,
    filter: &CameraFilter,
) -> Result<Vec<Camera>, PgStoreError> {
    let limit = filter.limit.unwrap_or(100).clamp(1, 500);
    let offset = filter.offset.unwrap_or(0).max(0);
    let search = filter.search.as_ref().map(|term| format!("%{}%", term.to_lowercase()));
    let site = filter.site_id.map(|id| id.as_uuid());
    let sql = format!(
        "SELECT {CAMERA_COLUMNS} FROM cameras \
         WHERE deleted_at IS NULL \
         AND ($1::uuid IS NULL OR site_id = $1) \
         AND ($2::text IS NULL OR search_text LIKE $2) \
         AND (NOT $3 OR enabled) \
         ORDER BY display_name, id LIMIT $4 OFFSET $5"
    );
    let rows = tx.query(sql.as_str(), &[&site, &search, &filter.enabled_only, &limit, &offset])?;
    rows.iter().map(camera_from_row).collect()
}

/// Fields updatable on a camera.
#[derive(Debug, Clone, Default)]
pub struct CameraUpdate {
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
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
}

/// Applies a partial update and refreshes `search_text` and `updated_at`.
///
/// # Errors
///
/// Returns [`PgStoreError::NotFound`] when the camera does not exist.
pub fn update_camera(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
    update: &CameraUpdate,
    now: OffsetDateTime,
) -> Result<Camera, PgStoreError> {
    let mut camera = get_camera(tx, camera_id)?.ok_or(PgStoreError::NotFound)?;
    if let Some(display_name) = &update.display_name {
        camera.display_name = display_name.clone();
    }
    if let Some(manufacturer) = &update.manufacturer {
        camera.manufacturer = Some(manufacturer.clone());
    }
    if let Some(model) = &update.model {
        camera.model = Some(model.clone());
    }
    if let Some(serial) = &update.serial {
        camera.serial = Some(serial.clone());
    }
    if let Some(mac) = &update.mac {
        camera.mac = Some(mac.clone());
    }
    if let Some(tags) = &update.tags {
        camera.tags = tags.iter().cloned().collect();
    }
    camera.updated_at = now;
    let tags: Vec<String> = camera.tags.iter().cloned().collect();
    tx.execute(
        "UPDATE cameras SET display_name = $2, manufacturer = $3, model = $4, serial = $5, \
         mac = $6, tags = $7, search_text = $8, updated_at = $9 \
         WHERE id = $1 AND deleted_at IS NULL",
        &[
            &camera_id.as_uuid(),
            &camera.display_name,
            &camera.manufacturer,
            &camera.model,
            &camera.serial,
            &camera.mac,
            &tags,
            &camera.search_text(),
            &now,
        ],
    )?;
    Ok(camera)
}

/// Soft-deletes a camera. Returns false when it was already absent.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn soft_delete_camera(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
    now: OffsetDateTime,
) -> Result<bool, PgStoreError> {
    let updated = tx.execute(
        "UPDATE cameras SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        &[&camera_id.as_uuid(), &now],
    )?;
    Ok(updated > 0)
}

/// Enables or disables a camera. Returns false when it was absent.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn set_camera_enabled(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
    enabled: bool,
    now: OffsetDateTime,
) -> Result<bool, PgStoreError> {
    let updated = tx.execute(
        "UPDATE cameras SET enabled = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        &[&camera_id.as_uuid(), &enabled, &now],
    )?;
    Ok(updated > 0)
}

/// Counts non-deleted cameras for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn camera_count(tx: &mut Transaction<'_>) -> Result<u32, PgStoreError> {
    let row = tx.query_one("SELECT count(*) FROM cameras WHERE deleted_at IS NULL", &[])?;
    let count: i64 = row.try_get(0)?;
    u32::try_from(count).map_err(|_| PgStoreError::Corrupt("camera count".to_string()))
}

// ============================================================================
// SECTION: Groups
// ============================================================================

/// Creates a camera group.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate names.
pub fn create_group(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    site_id: Option<SiteId>,
    name: &str,
) -> Result<CameraGroup, PgStoreError> {
    let id = GroupId::generate();
    tx.execute(
        "INSERT INTO camera_groups (id, tenant_id, site_id, name) VALUES ($1, $2, $3, $4)",
        &[&id.as_uuid(), &tenant_id.as_uuid(), &site_id.map(|id| id.as_uuid()), &name],
    )?;
    Ok(CameraGroup {
        id,
        tenant_id,
        site_id,
        name: name.to_string(),
    })
}

/// Lists groups for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_groups(tx: &mut Transaction<'_>) -> Result<Vec<CameraGroup>, PgStoreError> {
    let rows =
        tx.query("SELECT id, tenant_id, site_id, name FROM camera_groups ORDER BY name", &[])?;
    rows.iter()
        .map(|row| {
            Ok(CameraGroup {
                id: GroupId::new(row.try_get::<_, Uuid>("id")?),
                tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
                site_id: row.try_get::<_, Option<Uuid>>("site_id")?.map(SiteId::new),
                name: row.try_get("name")?,
            })
        })
        .collect()
}

/// Deletes a group. Returns false when it was absent.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn delete_group(tx: &mut Transaction<'_>, group_id: GroupId) -> Result<bool, PgStoreError> {
    let deleted = tx.execute("DELETE FROM camera_groups WHERE id = $1", &[&group_id.as_uuid()])?;
    Ok(deleted > 0)
}

/// Replaces a group's membership wholesale.
///
/// # Errors
///
/// Returns [`PgStoreError::NotFound`] when the group does not exist.
pub fn replace_group_members(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    group_id: GroupId,
    camera_ids: &[CameraId],
) -> Result<(), PgStoreError> {
    let exists = tx
        .query_opt("SELECT id FROM camera_groups WHERE id = $1", &[&group_id.as_uuid()])?
        .is_some();
    if !exists {
        return Err(PgStoreError::NotFound);
    }
    tx.execute("DELETE FROM group_members WHERE group_id = $1", &[&group_id.as_uuid()])?;
    for camera_id in camera_ids {
        tx.execute(
            "INSERT INTO group_members (tenant_id, group_id, camera_id) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
            &[&tenant_id.as_uuid(), &group_id.as_uuid(), &camera_id.as_uuid()],
        )?;
    }
    Ok(())
}

/// Lists camera ids belonging to a group.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn group_members(
    tx: &mut Transaction<'_>,
    group_id: GroupId,
) -> Result<Vec<CameraId>, PgStoreError> {
    let rows = tx.query(
        "SELECT camera_id FROM group_members WHERE group_id = $1 ORDER BY camera_id",
        &[&group_id.as_uuid()],
    )?;
    rows.iter()
        .map(|row| Ok(CameraId::new(row.try_get::<_, Uuid>("camera_id")?)))
        .collect()
}

// ============================================================================
// SECTION: Media Profiles
// ============================================================================

/// Replaces a camera's media profiles from a probe result.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails.
pub fn replace_media_profiles(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    camera_id: CameraId,
    profiles: &[MediaProfile],
) -> Result<(), PgStoreError> {
    tx.execute("DELETE FROM media_profiles WHERE camera_id = $1", &[&camera_id.as_uuid()])?;
    for profile in profiles {
        tx.execute(
            "INSERT INTO media_profiles (tenant_id, camera_id, token, codec, resolution, fps, \
             bitrate_kbps, rtsp_url) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &tenant_id.as_uuid(),
                &camera_id.as_uuid(),
                &profile.token,
                &profile.codec,
                &profile.resolution,
                &i32::from(profile.fps),
                &i32::try_from(profile.bitrate_kbps)
                    .map_err(|_| PgStoreError::Corrupt("bitrate".to_string()))?,
                &profile.rtsp_url,
            ],
        )?;
    }
    Ok(())
}

/// Lists a camera's media profiles.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_media_profiles(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
) -> Result<Vec<MediaProfile>, PgStoreError> {
    let rows = tx.query(
        "SELECT camera_id, token, codec, resolution, fps, bitrate_kbps, rtsp_url \
         FROM media_profiles WHERE camera_id = $1 ORDER BY token",
        &[&camera_id.as_uuid()],
    )?;
    rows.iter()
        .map(|row| {
            let fps: i32 = row.try_get("fps")?;
            let bitrate: i32 = row.try_get("bitrate_kbps")?;
            Ok(MediaProfile {
                camera_id: CameraId::new(row.try_get::<_, Uuid>("camera_id")?),
                token: row.try_get("token")?,
                codec: row.try_get("codec")?,
                resolution: row.try_get("resolution")?,
                fps: u16::try_from(fps)
                    .map_err(|_| PgStoreError::Corrupt("fps".to_string()))?,
                bitrate_kbps: u32::try_from(bitrate)
                    .map_err(|_| PgStoreError::Corrupt("bitrate".to_string()))?,
                rtsp_url: row.try_get("rtsp_url")?,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Stream Selection
// ============================================================================

/// Upserts a camera's stream selection, bumping the version monotonically.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn upsert_stream_selection(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    selection: &StreamSelection,
) -> Result<StreamSelection, PgStoreError> {
    let row = tx.query_one(
        "INSERT INTO stream_selections (tenant_id, camera_id, main_token, sub_token, \
         supports_sub, sub_equals_main, version) VALUES ($1, $2, $3, $4, $5, $6, 1) \
         ON CONFLICT (camera_id) DO UPDATE SET main_token = $3, sub_token = $4, \
         supports_sub = $5, sub_equals_main = $6, version = stream_selections.version + 1 \
         RETURNING version",
        &[
            &tenant_id.as_uuid(),
            &selection.camera_id.as_uuid(),
            &selection.main_token,
            &selection.sub_token,
            &selection.supports_sub,
            &selection.sub_equals_main,
        ],
    )?;
    let version: i64 = row.try_get("version")?;
    let mut stored = selection.clone();
    stored.version = version;
    Ok(stored)
}

/// Loads a camera's stream selection.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_stream_selection(
    tx: &mut Transaction<'_>,
    camera_id: CameraId,
) -> Result<Option<StreamSelection>, PgStoreError> {
    let row = tx.query_opt(
        "SELECT camera_id, main_token, sub_token, supports_sub, sub_equals_main, version \
         FROM stream_selections WHERE camera_id = $1",
        &[&camera_id.as_uuid()],
    )?;
    row.map(|row| {
        Ok(StreamSelection {
            camera_id: CameraId::new(row.try_get::<_, Uuid>("camera_id")?),
            main_token: row.try_get("main_token")?,
            sub_token: row.try_get("sub_token")?,
            supports_sub: row.try_get("supports_sub")?,
            sub_equals_main: row.try_get("sub_equals_main")?,
            version: row.try_get("version")?,
        })
    })
    .transpose()
}
