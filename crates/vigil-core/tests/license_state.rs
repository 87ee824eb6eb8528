// crates/vigil-core/tests/license_state.rs
// ============================================================================
// Module: License State Tests
// Description: Verify the grace/blocked state machine and operation gate.
// Purpose: Pin every boundary of the license lifecycle.
// Dependencies: vigil-core, time
// ============================================================================

//! License state machine and operation gate tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::collections::BTreeMap;

use time::Duration;
use time::OffsetDateTime;
use vigil_core::LicenseAlert;
use vigil_core::LicenseAlertTracker;
use vigil_core::LicenseLimits;
use vigil_core::LicenseParseFault;
use vigil_core::LicensePayload;
use vigil_core::LicenseSnapshot;
use vigil_core::LicenseState;
use vigil_core::LicensedOperation;
use vigil_core::TenantId;
use vigil_core::check_operation;
use vigil_core::evaluate_state;
use vigil_core::interfaces::memory::StaticUsage;

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

fn payload(issued: OffsetDateTime, valid_until: OffsetDateTime) -> LicensePayload {
    LicensePayload {
        license_id: "lic-001".to_string(),
        customer_name: "Acme Surveillance".to_string(),
        tenant_scope: "acme".to_string(),
        issued_at_utc: issued,
        valid_until_utc: valid_until,
        limits: LicenseLimits {
            max_cameras: 10,
            max_nvrs: 2,
        },
        features: BTreeMap::new(),
    }
}

fn snapshot(state: LicenseState, payload: Option<LicensePayload>) -> LicenseSnapshot {
    LicenseSnapshot {
        state,
        payload,
        evaluated_at: base_time(),
    }
}

#[test]
fn future_issue_date_is_a_parse_error() {
    let now = base_time();
    let lic = payload(now + Duration::hours(1), now + Duration::days(365));
    assert_eq!(
        evaluate_state(&lic, now),
        LicenseState::ParseError {
            fault: LicenseParseFault::FutureIssueDate
        }
    );
}

#[test]
fn valid_license_reports_ceiled_days_to_expiry() {
    let now = base_time();
    let lic = payload(now - Duration::days(10), now + Duration::hours(25));
    assert_eq!(
        evaluate_state(&lic, now),
        LicenseState::Valid {
            days_to_expiry: 2
        }
    );
}

#[test]
fn expiry_boundary_one_second_past_enters_grace() {
    let now = base_time();
    let lic = payload(now - Duration::days(30), now - Duration::seconds(1));
    assert!(matches!(evaluate_state(&lic, now), LicenseState::ExpiredGrace { .. }));
}

#[test]
fn grace_boundary_one_second_past_thirty_days_blocks() {
    let now = base_time();
    let lic = payload(
        now - Duration::days(90),
        now - Duration::days(30) - Duration::seconds(1),
    );
    assert_eq!(evaluate_state(&lic, now), LicenseState::ExpiredBlocked);
}

#[test]
fn exactly_thirty_days_past_expiry_is_still_grace() {
    let now = base_time();
    let lic = payload(now - Duration::days(90), now - Duration::days(30));
    assert!(matches!(evaluate_state(&lic, now), LicenseState::ExpiredGrace { .. }));
}

#[test]
fn grace_denies_capacity_growth_but_allows_general_ops() {
    let tenant = TenantId::generate();
    let usage = StaticUsage::new(3, 1);
    let snap = snapshot(
        LicenseState::ExpiredGrace {
            days_past_expiry: 2,
        },
        Some(payload(base_time() - Duration::days(90), base_time() - Duration::days(2))),
    );
    let denied = check_operation(LicensedOperation::CameraCreate, tenant, &snap, &usage, false)
        .unwrap_err();
    assert_eq!(denied.reason_code, "license_expired_grace");
    check_operation(LicensedOperation::General, tenant, &snap, &usage, false)
        .expect("general ops continue in grace");
}

#[test]
fn blocked_denies_everything() {
    let tenant = TenantId::generate();
    let usage = StaticUsage::new(0, 0);
    let snap = snapshot(LicenseState::ExpiredBlocked, None);
    for op in [
        LicensedOperation::CameraCreate,
        LicensedOperation::NvrCreate,
        LicensedOperation::General,
    ] {
        let denied = check_operation(op, tenant, &snap, &usage, false).unwrap_err();
        assert_eq!(denied.reason_code, "license_expired_blocked");
    }
}

#[test]
fn camera_create_allowed_only_under_capacity() {
    let tenant = TenantId::generate();
    let now = base_time();
    let lic = payload(now - Duration::days(1), now + Duration::days(100));
    let snap = snapshot(evaluate_state(&lic, now), Some(lic));

    let under = StaticUsage::new(9, 0);
    check_operation(LicensedOperation::CameraCreate, tenant, &snap, &under, false)
        .expect("one slot remains");

    let full = StaticUsage::new(10, 0);
    let denied = check_operation(LicensedOperation::CameraCreate, tenant, &snap, &full, false)
        .unwrap_err();
    assert_eq!(denied.reason_code, "license_camera_limit");
}

#[test]
fn missing_license_dev_mode_allows_small_camera_quota() {
    let tenant = TenantId::generate();
    let snap = snapshot(LicenseState::Missing, None);

    let usage = StaticUsage::new(0, 0);
    check_operation(LicensedOperation::CameraCreate, tenant, &snap, &usage, true)
        .expect("dev mode quota");

    let at_quota = StaticUsage::new(2, 0);
    let denied = check_operation(LicensedOperation::CameraCreate, tenant, &snap, &at_quota, true)
        .unwrap_err();
    assert_eq!(denied.reason_code, "dev_mode_camera_quota");

    let denied = check_operation(LicensedOperation::NvrCreate, tenant, &snap, &usage, true)
        .unwrap_err();
    assert_eq!(denied.reason_code, "license_missing");
}

#[test]
fn missing_license_without_dev_mode_denies() {
    let tenant = TenantId::generate();
    let usage = StaticUsage::new(0, 0);
    let snap = snapshot(LicenseState::Missing, None);
    let denied = check_operation(LicensedOperation::General, tenant, &snap, &usage, false)
        .unwrap_err();
    assert_eq!(denied.reason_code, "license_missing");
}

#[test]
fn alert_tracker_dedups_threshold_alerts() {
    let mut tracker = LicenseAlertTracker::new();
    let now = base_time();
    let state = LicenseState::Valid {
        days_to_expiry: 28,
    };
    assert_eq!(tracker.due_alert(state, now), Some(LicenseAlert::ThirtyDaysRemaining));
    assert_eq!(tracker.due_alert(state, now), None);

    let close = LicenseState::Valid {
        days_to_expiry: 6,
    };
    assert_eq!(tracker.due_alert(close, now), Some(LicenseAlert::SevenDaysRemaining));
    assert_eq!(tracker.due_alert(close, now), None);
}

#[test]
fn alert_tracker_emits_grace_alert_once_per_day() {
    let mut tracker = LicenseAlertTracker::new();
    let now = base_time();
    let state = LicenseState::ExpiredGrace {
        days_past_expiry: 1,
    };
    assert_eq!(tracker.due_alert(state, now), Some(LicenseAlert::GraceDaily));
    assert_eq!(tracker.due_alert(state, now + Duration::hours(2)), None);
    assert_eq!(
        tracker.due_alert(state, now + Duration::days(1)),
        Some(LicenseAlert::GraceDaily)
    );
}
