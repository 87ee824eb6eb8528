// crates/vigil-core/src/core/mod.rs
// ============================================================================
// Module: Vigil Core Types
// Description: Canonical control-plane schema and domain structures.
// Purpose: Provide stable, serializable types for the VMS control plane.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Core types define the control plane's entities, identifiers, permission
//! model, license lifecycle, detection payloads, and live-view contracts.
//! These types are the canonical source of truth for any derived API
//! surfaces (HTTP or bus payloads).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod detections;
pub mod entities;
pub mod error;
pub mod events;
pub mod identifiers;
pub mod license;
pub mod live;
pub mod permissions;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use detections::BASIC_CLASSES;
pub use detections::BoundingBox;
pub use detections::DETECTION_TTL_SECS;
pub use detections::DetectionError;
pub use detections::DetectionObject;
pub use detections::DetectionPayload;
pub use detections::DetectionStream;
pub use detections::MAX_DETECTION_BYTES;
pub use detections::MAX_DETECTION_OBJECTS;
pub use detections::StoredDetection;
pub use detections::WEAPON_CLASSES;
pub use detections::validate_detection;
pub use entities::Alert;
pub use entities::Camera;
pub use entities::CameraGroup;
pub use entities::CameraHealth;
pub use entities::CameraHealthStatus;
pub use entities::CameraNvrLink;
pub use entities::ChannelValidation;
pub use entities::CredentialOwner;
pub use entities::DiscoveredDevice;
pub use entities::DiscoveryRun;
pub use entities::DiscoveryRunStatus;
pub use entities::EventPollState;
pub use entities::GrantScope;
pub use entities::HEALTH_HISTORY_CAP;
pub use entities::HealthHistoryEntry;
pub use entities::MediaProfile;
pub use entities::NewCamera;
pub use entities::Nvr;
pub use entities::NvrChannel;
pub use entities::NvrStatus;
pub use entities::NvrVendor;
pub use entities::PlainCredential;
pub use entities::ProvisioningState;
pub use entities::RecordingMode;
pub use entities::Role;
pub use entities::Site;
pub use entities::StreamSelection;
pub use entities::Tenant;
pub use entities::User;
pub use error::DomainError;
pub use error::ErrorKind;
pub use events::AuditEvent;
pub use events::AuditEventParams;
pub use events::AuditResult;
pub use events::NvrEvent;
pub use events::RawNvrEvent;
pub use identifiers::AlertId;
pub use identifiers::AuditEventId;
pub use identifiers::CameraId;
pub use identifiers::ChannelId;
pub use identifiers::CredentialId;
pub use identifiers::DeviceId;
pub use identifiers::DiscoveryRunId;
pub use identifiers::GroupId;
pub use identifiers::IdentifierParseError;
pub use identifiers::NvrId;
pub use identifiers::RoleId;
pub use identifiers::SessionId;
pub use identifiers::SiteId;
pub use identifiers::TenantId;
pub use identifiers::UserId;
pub use license::DEV_MODE_CAMERA_QUOTA;
pub use license::GRACE_PERIOD_DAYS;
pub use license::LicenseAlert;
pub use license::LicenseAlertTracker;
pub use license::LicenseLimits;
pub use license::LicenseParseFault;
pub use license::LicensePayload;
pub use license::LicenseSnapshot;
pub use license::LicenseState;
pub use license::LicensedOperation;
pub use license::MAX_LICENSE_FILE_BYTES;
pub use license::UsageProvider;
pub use license::check_operation;
pub use license::evaluate_state;
pub use live::FallbackPolicy;
pub use live::HlsPath;
pub use live::IDEMPOTENCY_WINDOW_SECS;
pub use live::LIVE_LIMIT_ERROR;
pub use live::LiveStartResponse;
pub use live::MAX_SESSIONS_PER_USER;
pub use live::SESSION_TTL_SECS;
pub use live::StreamQuality;
pub use live::TELEMETRY_RATE_LIMIT;
pub use live::TELEMETRY_RATE_WINDOW_SECS;
pub use live::TelemetryEvent;
pub use live::TelemetryEventType;
pub use live::TelemetryPolicy;
pub use live::TelemetryReasonCode;
pub use live::ViewMode;
pub use live::ViewerSession;
pub use live::WebRtcPath;
pub use permissions::CheckTarget;
pub use permissions::GRANT_CACHE_CAP;
pub use permissions::GRANT_CACHE_TTL;
pub use permissions::Grant;
pub use permissions::GrantCache;
pub use permissions::GrantSet;
pub use permissions::PERMISSION_CATALOG;
pub use permissions::is_known_permission;
