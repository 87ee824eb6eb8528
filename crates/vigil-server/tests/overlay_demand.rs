// crates/vigil-server/tests/overlay_demand.rs
// ============================================================================
// Module: Overlay Demand Tests
// Description: Demand TTL, sweeping, and the detection cache contract.
// Purpose: Pin the AI fan-out surface at the service seam.
// Dependencies: vigil-server, vigil-core
// ============================================================================

//! Overlay demand and detection cache tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::sync::Arc;

use time::Duration;
use time::OffsetDateTime;
use vigil_core::BoundingBox;
use vigil_core::CameraId;
use vigil_core::DetectionObject;
use vigil_core::DetectionPayload;
use vigil_core::DetectionStream;
use vigil_core::ErrorKind;
use vigil_core::InMemoryDemandRegistry;
use vigil_core::InMemoryDetectionCache;
use vigil_core::TenantId;
use vigil_server::overlay::OverlayService;

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

fn service() -> OverlayService {
    OverlayService::new(
        Arc::new(InMemoryDemandRegistry::new()),
        Arc::new(InMemoryDetectionCache::new()),
    )
}

fn payload(ts: OffsetDateTime) -> DetectionPayload {
    DetectionPayload {
        ts_unix_ms: ts.unix_timestamp() * 1_000,
        objects: vec![DetectionObject {
            label: "person".to_string(),
            confidence: 0.91,
            bbox: BoundingBox {
                x: 0.1,
                y: 0.1,
                w: 0.4,
                h: 0.6,
            },
        }],
    }
}

#[test]
fn demand_expires_after_twenty_seconds() {
    let service = service();
    let camera = CameraId::generate();
    let now = base_time();
    service.refresh_demand(camera, now).unwrap();
    assert_eq!(service.active_cameras(now + Duration::seconds(19)).unwrap(), vec![camera]);
    assert!(service.active_cameras(now + Duration::seconds(20)).unwrap().is_empty());
}

#[test]
fn refresh_extends_demand() {
    let service = service();
    let camera = CameraId::generate();
    let now = base_time();
    service.refresh_demand(camera, now).unwrap();
    service.refresh_demand(camera, now + Duration::seconds(15)).unwrap();
    assert_eq!(
        service.active_cameras(now + Duration::seconds(30)).unwrap(),
        vec![camera]
    );
}

#[test]
fn sweep_drops_only_stale_members() {
    let service = service();
    let fresh = CameraId::generate();
    let stale = CameraId::generate();
    let now = base_time();
    service.refresh_demand(stale, now).unwrap();
    service.refresh_demand(fresh, now + Duration::seconds(25)).unwrap();
    let dropped = service.sweep_demand(now + Duration::seconds(30)).unwrap();
    assert_eq!(dropped, 1);
    assert_eq!(
        service.active_cameras(now + Duration::seconds(30)).unwrap(),
        vec![fresh]
    );
}

#[test]
fn detections_round_trip_with_age() {
    let service = service();
    let tenant = TenantId::generate();
    let camera = CameraId::generate();
    let captured = base_time();
    service
        .put_detection(tenant, camera, DetectionStream::Basic, &payload(captured), 256, captured)
        .unwrap();
    let read_at = captured + Duration::seconds(3);
    let stored = service
        .latest_detection(tenant, camera, DetectionStream::Basic, read_at)
        .unwrap()
        .unwrap();
    assert_eq!(stored.age_ms, 3_000);
    assert_eq!(stored.payload.objects.len(), 1);
}

#[test]
fn detections_expire_after_ten_seconds() {
    let service = service();
    let tenant = TenantId::generate();
    let camera = CameraId::generate();
    let captured = base_time();
    service
        .put_detection(tenant, camera, DetectionStream::Basic, &payload(captured), 256, captured)
        .unwrap();
    let read_at = captured + Duration::seconds(11);
    assert!(service
        .latest_detection(tenant, camera, DetectionStream::Basic, read_at)
        .unwrap()
        .is_none());
}

#[test]
fn invalid_payload_is_rejected_before_storage() {
    let service = service();
    let tenant = TenantId::generate();
    let camera = CameraId::generate();
    let now = base_time();
    let mut bad = payload(now);
    bad.objects[0].bbox.w = 2.0;
    let err = service
        .put_detection(tenant, camera, DetectionStream::Basic, &bad, 256, now)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(service
        .latest_detection(tenant, camera, DetectionStream::Basic, now)
        .unwrap()
        .is_none());
}

#[test]
fn streams_are_isolated() {
    let service = service();
    let tenant = TenantId::generate();
    let camera = CameraId::generate();
    let now = base_time();
    service
        .put_detection(tenant, camera, DetectionStream::Basic, &payload(now), 256, now)
        .unwrap();
    assert!(service
        .latest_detection(tenant, camera, DetectionStream::Weapon, now)
        .unwrap()
        .is_none());
}
