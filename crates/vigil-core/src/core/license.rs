// crates/vigil-core/src/core/license.rs
// ============================================================================
// Module: License Lifecycle
// Description: License payload, grace/blocked state machine, operation gate.
// Purpose: Decide which operations the current license state allows.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The license payload is parsed and signature-verified elsewhere; this module
//! owns the pure state machine over `(now, issued_at, valid_until)` and the
//! operation gate that combines state with capacity usage. Evaluation is a
//! pure function of its inputs so every transition is unit-testable.
//!
//! ## Invariants
//! - A payload issued in the future never reaches `Valid`.
//! - `ExpiredGrace` lasts exactly [`GRACE_PERIOD_DAYS`] days past expiry.
//! - Capacity-increasing operations are denied in every state except `Valid`
//!   (and `Missing` under the dev-mode relaxation, within its small quota).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::Duration;
use time::OffsetDateTime;

use crate::core::error::DomainError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::TenantId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Days past `valid_until` during which existing service continues.
pub const GRACE_PERIOD_DAYS: i64 = 30;

/// Camera quota allowed in the `Missing` state when dev mode is enabled.
pub const DEV_MODE_CAMERA_QUOTA: u32 = 2;

/// Maximum accepted license file size in bytes.
pub const MAX_LICENSE_FILE_BYTES: u64 = 64 * 1024;

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Capacity limits carried by a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseLimits {
    /// Maximum camera records allowed.
    pub max_cameras: u32,
    /// Maximum NVR records allowed.
    pub max_nvrs: u32,
}

/// The decoded license payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePayload {
    /// License identifier.
    pub license_id: String,
    /// Customer display name.
    pub customer_name: String,
    /// Tenant scope label the license applies to.
    pub tenant_scope: String,
    /// Issue timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at_utc: OffsetDateTime,
    /// Expiry timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until_utc: OffsetDateTime,
    /// Capacity limits.
    pub limits: LicenseLimits,
    /// Feature flags by name.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl LicensePayload {
    /// Returns true when the named feature is enabled.
    #[must_use]
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }
}

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// Parse-stage failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseParseFault {
    /// The envelope or payload JSON failed to decode.
    MalformedEnvelope,
    /// The file exceeded [`MAX_LICENSE_FILE_BYTES`].
    FileTooLarge,
    /// The payload's issue date is in the future.
    FutureIssueDate,
}

impl LicenseParseFault {
    /// Returns the stable reason-code label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedEnvelope => "malformed_envelope",
            Self::FileTooLarge => "file_too_large",
            Self::FutureIssueDate => "future_issue_date",
        }
    }
}

/// The license lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LicenseState {
    /// License is valid.
    Valid {
        /// Whole days until expiry, rounded up.
        days_to_expiry: i64,
    },
    /// Past expiry but inside the grace window: existing service continues,
    /// capacity growth is denied.
    ExpiredGrace {
        /// Whole days since expiry, rounded up.
        days_past_expiry: i64,
    },
    /// Past the grace window: all licensed operations are denied.
    ExpiredBlocked,
    /// The file failed to parse.
    ParseError {
        /// Parse failure classification.
        fault: LicenseParseFault,
    },
    /// The signature did not verify.
    InvalidSignature,
    /// No license file is present.
    Missing,
}

impl LicenseState {
    /// Returns the stable state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::ExpiredGrace { .. } => "expired_grace",
            Self::ExpiredBlocked => "expired_blocked",
            Self::ParseError { .. } => "parse_error",
            Self::InvalidSignature => "invalid_signature",
            Self::Missing => "missing",
        }
    }
}

/// Evaluates the state machine over a verified payload.
#[must_use]
pub fn evaluate_state(payload: &LicensePayload, now: OffsetDateTime) -> LicenseState {
    if now < payload.issued_at_utc {
        return LicenseState::ParseError {
            fault: LicenseParseFault::FutureIssueDate,
        };
    }
    if now <= payload.valid_until_utc {
        let days_to_expiry = ceil_days(payload.valid_until_utc - now);
        return LicenseState::Valid {
            days_to_expiry,
        };
    }
    let grace_end = payload.valid_until_utc + Duration::days(GRACE_PERIOD_DAYS);
    if now <= grace_end {
        let days_past_expiry = ceil_days(now - payload.valid_until_utc);
        return LicenseState::ExpiredGrace {
            days_past_expiry,
        };
    }
    LicenseState::ExpiredBlocked
}

/// Rounds a positive duration up to whole days.
fn ceil_days(duration: Duration) -> i64 {
    let seconds = duration.whole_seconds().max(0);
    seconds.div_euclid(86_400) + i64::from(seconds.rem_euclid(86_400) > 0)
}

// ============================================================================
// SECTION: Operation Gate
// ============================================================================

/// Operations subject to license gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicensedOperation {
    /// Creating a camera; consumes camera capacity.
    CameraCreate,
    /// Creating an NVR; consumes NVR capacity.
    NvrCreate,
    /// Any other licensed operation; gated by state only.
    General,
}

impl LicensedOperation {
    /// Parses an operation label in `resource.action` form.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "camera.create" => Self::CameraCreate,
            "nvr.create" => Self::NvrCreate,
            _ => Self::General,
        }
    }
}

/// Capacity usage source, backed by the inventory store.
pub trait UsageProvider: Send + Sync {
    /// Returns the current non-deleted camera count for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn camera_count(&self, tenant_id: TenantId) -> Result<u32, DomainError>;

    /// Returns the current non-deleted NVR count for the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn nvr_count(&self, tenant_id: TenantId) -> Result<u32, DomainError>;
}

/// A license snapshot: the evaluated state plus the payload when one exists.
#[derive(Debug, Clone)]
pub struct LicenseSnapshot {
    /// Evaluated lifecycle state.
    pub state: LicenseState,
    /// Verified payload; absent for missing or unreadable licenses.
    pub payload: Option<LicensePayload>,
    /// When the snapshot was produced.
    pub evaluated_at: OffsetDateTime,
}

impl LicenseSnapshot {
    /// Builds a snapshot for a state without a payload.
    #[must_use]
    pub fn without_payload(state: LicenseState, evaluated_at: OffsetDateTime) -> Self {
        Self {
            state,
            payload: None,
            evaluated_at,
        }
    }
}

/// Checks whether the snapshot allows an operation for a tenant.
///
/// # Errors
///
/// Returns a [`DomainError`] of kind [`ErrorKind::LicenseBlocked`] when the
/// operation is denied, or propagates the usage provider's failure.
pub fn check_operation(
    operation: LicensedOperation,
    tenant_id: TenantId,
    snapshot: &LicenseSnapshot,
    usage: &dyn UsageProvider,
    dev_mode: bool,
) -> Result<(), DomainError> {
    match snapshot.state {
        LicenseState::InvalidSignature => {
            Err(denial("license_invalid_signature"))
        }
        LicenseState::ParseError { .. } => Err(denial("license_parse_error")),
        LicenseState::ExpiredBlocked => Err(denial("license_expired_blocked")),
        LicenseState::ExpiredGrace { .. } => match operation {
            LicensedOperation::CameraCreate | LicensedOperation::NvrCreate => {
                Err(denial("license_expired_grace"))
            }
            LicensedOperation::General => Ok(()),
        },
        LicenseState::Missing => {
            if !dev_mode {
                return Err(denial("license_missing"));
            }
            match operation {
                LicensedOperation::CameraCreate => {
                    let count = usage.camera_count(tenant_id)?;
                    if count >= DEV_MODE_CAMERA_QUOTA {
                        return Err(denial("dev_mode_camera_quota"));
                    }
                    Ok(())
                }
                LicensedOperation::NvrCreate => Err(denial("license_missing")),
                LicensedOperation::General => Ok(()),
            }
        }
        LicenseState::Valid { .. } => {
            let Some(payload) = snapshot.payload.as_ref() else {
                return Err(denial("license_payload_absent"));
            };
            match operation {
                LicensedOperation::CameraCreate => {
                    let count = usage.camera_count(tenant_id)?;
                    if count >= payload.limits.max_cameras {
                        return Err(denial("license_camera_limit"));
                    }
                    Ok(())
                }
                LicensedOperation::NvrCreate => {
                    let count = usage.nvr_count(tenant_id)?;
                    if count >= payload.limits.max_nvrs {
                        return Err(denial("license_nvr_limit"));
                    }
                    Ok(())
                }
                LicensedOperation::General => Ok(()),
            }
        }
    }
}

/// Builds a license-blocked denial with a stable reason code.
fn denial(reason_code: &'static str) -> DomainError {
    DomainError::new(ErrorKind::LicenseBlocked, reason_code, "operation denied by license state")
}

// ============================================================================
// SECTION: Expiry Alerts
// ============================================================================

/// Deduplicated license expiry alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseAlert {
    /// Thirty days of validity remain.
    ThirtyDaysRemaining,
    /// Seven days of validity remain.
    SevenDaysRemaining,
    /// The license is in its grace window; emitted at most daily.
    GraceDaily,
}

impl LicenseAlert {
    /// Returns the stable alert label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThirtyDaysRemaining => "license_expiring_30d",
            Self::SevenDaysRemaining => "license_expiring_7d",
            Self::GraceDaily => "license_in_grace",
        }
    }
}

/// Tracks which expiry alerts have been emitted, deduplicating repeats.
///
/// # Invariants
/// - The 30-day and 7-day alerts fire at most once per loaded license.
/// - The grace alert fires at most once per calendar day.
#[derive(Debug, Default, Clone)]
pub struct LicenseAlertTracker {
    /// Whether the 30-day alert has fired.
    sent_thirty: bool,
    /// Whether the 7-day alert has fired.
    sent_seven: bool,
    /// Calendar day the grace alert last fired.
    last_grace_day: Option<Date>,
}

impl LicenseAlertTracker {
    /// Creates a tracker with no alerts sent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the tracker; called when a new license loads.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns the alert due for the current state, recording it as sent.
    pub fn due_alert(&mut self, state: LicenseState, now: OffsetDateTime) -> Option<LicenseAlert> {
        match state {
            LicenseState::Valid { days_to_expiry } => {
                if days_to_expiry <= 7 && !self.sent_seven {
                    self.sent_seven = true;
                    // A license already inside seven days also satisfies the
                    // thirty-day notice.
                    self.sent_thirty = true;
                    return Some(LicenseAlert::SevenDaysRemaining);
                }
                if days_to_expiry <= 30 && !self.sent_thirty {
                    self.sent_thirty = true;
                    return Some(LicenseAlert::ThirtyDaysRemaining);
                }
                None
            }
            LicenseState::ExpiredGrace { .. } => {
                let today = now.date();
                if self.last_grace_day == Some(today) {
                    return None;
                }
                self.last_grace_day = Some(today);
                Some(LicenseAlert::GraceDaily)
            }
            _ => None,
        }
    }
}
