// crates/vigil-core/src/core/entities.rs
// ============================================================================
// Module: Domain Entities
// Description: Canonical control-plane entities for inventory and devices.
// Purpose: Provide stable, serializable types shared by stores and services.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Control-plane entities for tenants, sites, users, cameras, NVRs, discovery
//! and health. These types are the canonical source of truth for any derived
//! API surfaces. Tenant scoping is carried explicitly on every scoped entity;
//! row-level enforcement lives in the store layer.
//!
//! ## Invariants
//! - Soft-deleted entities carry `deleted_at` and never surface through reads.
//! - Persisted RTSP URLs never contain an embedded userinfo segment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::AlertId;
use crate::core::identifiers::CameraId;
use crate::core::identifiers::ChannelId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::DiscoveryRunId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::NvrId;
use crate::core::identifiers::RoleId;
use crate::core::identifiers::SiteId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Tenancy
// ============================================================================

/// A tenant: the root of every ownership scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Globally unique identifier.
    pub id: TenantId,
    /// Stable display name.
    pub name: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A site within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Site identifier.
    pub id: SiteId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A user account within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Login email; unique per tenant among non-deleted users.
    pub email: String,
    /// Password hash in PHC string format. Never serialized to API surfaces.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Hash algorithm label (e.g. `argon2id`).
    pub password_algo: String,
    /// When the password hash last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub password_updated_at: OffsetDateTime,
    /// Whether the account is administratively disabled.
    pub disabled: bool,
    /// Soft-delete marker.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A role within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier.
    pub id: RoleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Role name, unique per tenant.
    pub name: String,
    /// Whether the role is a seeded system role.
    pub system: bool,
}

/// Scope of a role grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum GrantScope {
    /// Grant applies tenant-wide.
    Tenant,
    /// Grant applies to a single site.
    Site {
        /// Target site.
        site_id: SiteId,
    },
}

// ============================================================================
// SECTION: Cameras
// ============================================================================

/// A camera in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Camera identifier.
    pub id: CameraId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning site.
    pub site_id: SiteId,
    /// Display name.
    pub display_name: String,
    /// Device IP address.
    pub ip: IpAddr,
    /// Device port (1-65535).
    pub port: u16,
    /// Manufacturer, when known.
    pub manufacturer: Option<String>,
    /// Model, when known.
    pub model: Option<String>,
    /// Serial number, when known.
    pub serial: Option<String>,
    /// MAC address, when known.
    pub mac: Option<String>,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
    /// Whether the camera participates in probing and live view.
    pub enabled: bool,
    /// Soft-delete marker.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Camera {
    /// Returns the derived text used for trigram search.
    #[must_use]
    pub fn search_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.display_name);
        text.push(' ');
        text.push_str(&self.ip.to_string());
        for field in [&self.manufacturer, &self.model, &self.serial, &self.mac] {
            if let Some(value) = field {
                text.push(' ');
                text.push_str(value);
            }
        }
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}

/// Parameters for creating a camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCamera {
    /// Owning site.
    pub site_id: SiteId,
    /// Display name.
    pub display_name: String,
    /// Device IP address.
    pub ip: IpAddr,
    /// Device port (1-65535).
    pub port: u16,
    /// Manufacturer, when known.
    pub manufacturer: Option<String>,
    /// Model, when known.
    pub model: Option<String>,
    /// Serial number, when known.
    pub serial: Option<String>,
    /// MAC address, when known.
    pub mac: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A camera group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Optional site restriction.
    pub site_id: Option<SiteId>,
    /// Display name.
    pub name: String,
}

/// A media profile advertised by a camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProfile {
    /// Owning camera.
    pub camera_id: CameraId,
    /// Stream token, unique per camera.
    pub token: String,
    /// Codec label (e.g. `h264`).
    pub codec: String,
    /// Resolution as `WxH`.
    pub resolution: String,
    /// Frames per second.
    pub fps: u16,
    /// Bitrate in kbit/s.
    pub bitrate_kbps: u32,
    /// RTSP URL with credentials stripped.
    pub rtsp_url: String,
}

/// Stream selection for a camera: which profiles serve main and sub quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSelection {
    /// Owning camera.
    pub camera_id: CameraId,
    /// Main-quality profile token.
    pub main_token: String,
    /// Sub-quality profile token, when distinct.
    pub sub_token: Option<String>,
    /// Whether the device supports a sub stream at all.
    pub supports_sub: bool,
    /// Whether the sub stream resolves to the main profile.
    pub sub_equals_main: bool,
    /// Monotonically increasing selection version.
    pub version: i64,
}

// ============================================================================
// SECTION: NVRs
// ============================================================================

/// Supported NVR vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NvrVendor {
    /// Hikvision ISAPI devices.
    Hikvision,
    /// Dahua HTTP-API devices.
    Dahua,
    /// Generic ONVIF Profile G devices.
    Onvif,
}

impl NvrVendor {
    /// Returns the stable vendor label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hikvision => "hikvision",
            Self::Dahua => "dahua",
            Self::Onvif => "onvif",
        }
    }

    /// Parses a vendor label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hikvision" => Some(Self::Hikvision),
            "dahua" => Some(Self::Dahua),
            "onvif" => Some(Self::Onvif),
            _ => None,
        }
    }
}

/// NVR reachability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NvrStatus {
    /// Not yet probed.
    Unknown,
    /// Reachable and authenticated.
    Online,
    /// Unreachable.
    Offline,
    /// Reachable but credentials rejected.
    AuthFailed,
    /// Reachable but responding with errors.
    Error,
}

impl NvrStatus {
    /// Returns the stable status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::AuthFailed => "auth_failed",
            Self::Error => "error",
        }
    }
}

/// A network video recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nvr {
    /// NVR identifier.
    pub id: NvrId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning site.
    pub site_id: SiteId,
    /// Display name.
    pub display_name: String,
    /// Vendor adapter to use.
    pub vendor: NvrVendor,
    /// Device IP address.
    pub ip: IpAddr,
    /// Device port.
    pub port: u16,
    /// Last observed status.
    pub status: NvrStatus,
    /// When the status last changed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_status_at: Option<OffsetDateTime>,
    /// Whether the NVR participates in polling.
    pub enabled: bool,
    /// Soft-delete marker.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Channel provisioning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// No camera has been created for the channel.
    NotCreated,
    /// A camera record exists for the channel.
    Created,
}

/// Channel validation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelValidation {
    /// Not yet validated.
    Unknown,
    /// Stream reachable and decodable.
    Ok,
    /// Credentials rejected.
    Unauthorized,
    /// Probe timed out.
    Timeout,
    /// Probe failed with a device error.
    Error,
}

/// A channel exposed by an NVR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvrChannel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Owning NVR.
    pub nvr_id: NvrId,
    /// Stable vendor channel reference (e.g. `101`).
    pub channel_ref: String,
    /// Channel display name reported by the device.
    pub name: String,
    /// Provisioning state.
    pub provisioning: ProvisioningState,
    /// Validation status.
    pub validation: ChannelValidation,
    /// Camera created from this channel, when provisioned.
    pub camera_id: Option<CameraId>,
}

/// Recording mode for a camera linked to an NVR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// The VMS media plane records the stream.
    Vms,
    /// The NVR records; the VMS only brokers live view.
    Nvr,
}

/// Link between a camera and its backing NVR channel. At most one per camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraNvrLink {
    /// Linked camera.
    pub camera_id: CameraId,
    /// Backing NVR.
    pub nvr_id: NvrId,
    /// Backing channel reference.
    pub channel_ref: String,
    /// Recording ownership.
    pub recording_mode: RecordingMode,
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Status of an asynchronous discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryRunStatus {
    /// Scan in progress.
    Running,
    /// Scan finished without errors.
    Completed,
    /// Scan finished with some probe errors.
    PartiallyCompleted,
    /// Scan aborted.
    Failed,
}

/// An asynchronous discovery job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    /// Run identifier.
    pub id: DiscoveryRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Optional site restriction for the scan.
    pub site_id: Option<SiteId>,
    /// Run status.
    pub status: DiscoveryRunStatus,
    /// Devices found so far.
    pub device_count: u32,
    /// Probe errors so far.
    pub error_count: u32,
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the run finished, if it has.
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

/// A device found by WS-Discovery, enriched by ONVIF probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Device identifier.
    pub id: DeviceId,
    /// Owning run.
    pub run_id: DiscoveryRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Extracted IPv4 address.
    pub ip: IpAddr,
    /// Advertised ONVIF service addresses.
    pub xaddrs: Vec<String>,
    /// Profile S support hint from scopes.
    pub profile_s: bool,
    /// Profile T support hint from scopes.
    pub profile_t: bool,
    /// Profile G support hint from scopes.
    pub profile_g: bool,
    /// Device capabilities blob from `GetCapabilities`.
    pub capabilities: Value,
    /// Media profiles blob from `GetProfiles`.
    pub media_profiles: Value,
    /// Credential-stripped stream URIs from `GetStreamUri`.
    pub rtsp_uris: Value,
    /// Coarse failure classification from the last probe.
    pub last_error_code: Option<String>,
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Camera probe outcome states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraHealthStatus {
    /// Stream reachable and answering.
    Online,
    /// Device unreachable.
    Offline,
    /// Device reachable but credentials rejected.
    AuthFailed,
    /// Device reachable but the stream negotiation failed.
    StreamError,
}

impl CameraHealthStatus {
    /// Returns the stable status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::AuthFailed => "auth_failed",
            Self::StreamError => "stream_error",
        }
    }
}

/// Current health snapshot for a camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraHealth {
    /// Subject camera.
    pub camera_id: CameraId,
    /// Last probe outcome.
    pub status: CameraHealthStatus,
    /// When the camera was last probed.
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked_at: OffsetDateTime,
    /// When a probe last succeeded.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Consecutive failed probes.
    pub consecutive_failures: u32,
    /// Coarse code for the last failure.
    pub last_error_code: Option<String>,
}

/// One bounded history entry for a camera probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthHistoryEntry {
    /// When the probe ran.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Probe outcome.
    pub status: CameraHealthStatus,
    /// Failure reason, when failed.
    pub reason: Option<String>,
    /// Probe round-trip in milliseconds.
    pub rtt_ms: Option<u32>,
}

/// Maximum retained history entries per camera.
pub const HEALTH_HISTORY_CAP: usize = 200;

/// An open or closed health alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier.
    pub id: AlertId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Subject camera.
    pub camera_id: CameraId,
    /// Alert kind label (e.g. `offline_over_5m`).
    pub kind: String,
    /// When the alert opened.
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    /// When the alert closed, if it has.
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    /// When a notification was last sent for the alert.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_notified_at: Option<OffsetDateTime>,
}

/// Poll cursor state for an NVR event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPollState {
    /// Subject NVR.
    pub nvr_id: NvrId,
    /// Vendor-opaque resume cursor.
    pub cursor: Option<String>,
    /// Earliest event time of interest.
    #[serde(with = "time::serde::rfc3339::option")]
    pub since: Option<OffsetDateTime>,
    /// When a poll last succeeded.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Consecutive failed polls.
    pub consecutive_failures: u32,
    /// Coarse code for the last failure.
    pub last_error_code: Option<String>,
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Owner of an encrypted credential record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "owner_type", content = "owner_id", rename_all = "snake_case")]
pub enum CredentialOwner {
    /// Camera device credentials.
    Camera(CameraId),
    /// NVR device credentials.
    Nvr(NvrId),
    /// Bootstrap ONVIF credentials used during discovery probes.
    OnvifBootstrap(DeviceId),
}

impl CredentialOwner {
    /// Returns the stable owner-type label.
    #[must_use]
    pub const fn type_label(self) -> &'static str {
        match self {
            Self::Camera(_) => "camera",
            Self::Nvr(_) => "nvr",
            Self::OnvifBootstrap(_) => "onvif_bootstrap",
        }
    }

    /// Returns the owner identifier as a UUID.
    #[must_use]
    pub const fn owner_uuid(self) -> uuid::Uuid {
        match self {
            Self::Camera(id) => id.as_uuid(),
            Self::Nvr(id) => id.as_uuid(),
            Self::OnvifBootstrap(id) => id.as_uuid(),
        }
    }
}

/// A decrypted device credential. Held transiently; never persisted as-is.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlainCredential {
    /// Device username.
    pub username: String,
    /// Device password.
    pub password: String,
}

impl std::fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Redacted so credentials never reach logs through Debug formatting.
        f.debug_struct("PlainCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    fn sample_camera() -> Camera {
        Camera {
            id: CameraId::generate(),
            tenant_id: TenantId::generate(),
            site_id: SiteId::generate(),
            display_name: "Lobby East".to_string(),
            ip: "192.168.1.10".parse().unwrap(),
            port: 554,
            manufacturer: Some("Axis".to_string()),
            model: None,
            serial: None,
            mac: Some("AA:BB:CC:DD:EE:FF".to_string()),
            tags: ["entrance".to_string()].into_iter().collect(),
            enabled: true,
            deleted_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn search_text_folds_fields_lowercase() {
        let camera = sample_camera();
        let text = camera.search_text();
        assert!(text.contains("lobby east"));
        assert!(text.contains("192.168.1.10"));
        assert!(text.contains("aa:bb:cc:dd:ee:ff"));
        assert!(text.contains("entrance"));
    }

    #[test]
    fn plain_credential_debug_redacts_password() {
        let cred = PlainCredential {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn vendor_labels_round_trip() {
        for vendor in [NvrVendor::Hikvision, NvrVendor::Dahua, NvrVendor::Onvif] {
            assert_eq!(NvrVendor::parse(vendor.as_str()), Some(vendor));
        }
        assert_eq!(NvrVendor::parse("acme"), None);
    }
}
