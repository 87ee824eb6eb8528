// crates/vigil-core/tests/detection_validation.rs
// ============================================================================
// Module: Detection Validation Tests
// Description: Verify write-side detection payload validation.
// Purpose: Pin the unit-square predicate and class-set membership rules.
// Dependencies: vigil-core, proptest
// ============================================================================

//! Detection payload validation tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use proptest::prelude::*;
use vigil_core::BoundingBox;
use vigil_core::DetectionError;
use vigil_core::DetectionObject;
use vigil_core::DetectionPayload;
use vigil_core::DetectionStream;
use vigil_core::MAX_DETECTION_BYTES;
use vigil_core::MAX_DETECTION_OBJECTS;
use vigil_core::validate_detection;

fn object(label: &str, confidence: f64, bbox: BoundingBox) -> DetectionObject {
    DetectionObject {
        label: label.to_string(),
        confidence,
        bbox,
    }
}

fn unit_box() -> BoundingBox {
    BoundingBox {
        x: 0.1,
        y: 0.1,
        w: 0.5,
        h: 0.5,
    }
}

fn payload(objects: Vec<DetectionObject>) -> DetectionPayload {
    DetectionPayload {
        ts_unix_ms: 1_750_000_000_000,
        objects,
    }
}

#[test]
fn accepts_valid_basic_payload() {
    let p = payload(vec![object("person", 0.92, unit_box())]);
    validate_detection(DetectionStream::Basic, &p, 256).expect("valid payload");
}

#[test]
fn rejects_oversized_payload() {
    let p = payload(vec![]);
    let err = validate_detection(DetectionStream::Basic, &p, MAX_DETECTION_BYTES + 1).unwrap_err();
    assert_eq!(err, DetectionError::PayloadTooLarge);
}

#[test]
fn rejects_too_many_objects() {
    let objects = (0..=MAX_DETECTION_OBJECTS)
        .map(|_| object("person", 0.5, unit_box()))
        .collect();
    let err = validate_detection(DetectionStream::Basic, &payload(objects), 1024).unwrap_err();
    assert_eq!(err, DetectionError::TooManyObjects);
}

#[test]
fn rejects_box_exceeding_unit_square() {
    let bbox = BoundingBox {
        x: 0.7,
        y: 0.1,
        w: 0.4,
        h: 0.5,
    };
    let p = payload(vec![object("person", 0.5, bbox)]);
    let err = validate_detection(DetectionStream::Basic, &p, 256).unwrap_err();
    assert_eq!(err, DetectionError::InvalidBox(0));
}

#[test]
fn rejects_zero_area_box() {
    let bbox = BoundingBox {
        x: 0.2,
        y: 0.2,
        w: 0.0,
        h: 0.3,
    };
    let p = payload(vec![object("person", 0.5, bbox)]);
    let err = validate_detection(DetectionStream::Basic, &p, 256).unwrap_err();
    assert_eq!(err, DetectionError::InvalidBox(0));
}

#[test]
fn rejects_confidence_out_of_range() {
    let p = payload(vec![object("person", 1.2, unit_box())]);
    let err = validate_detection(DetectionStream::Basic, &p, 256).unwrap_err();
    assert_eq!(err, DetectionError::InvalidConfidence(0));
}

#[test]
fn rejects_weapon_label_on_basic_stream() {
    let p = payload(vec![object("handgun", 0.9, unit_box())]);
    let err = validate_detection(DetectionStream::Basic, &p, 256).unwrap_err();
    assert!(matches!(err, DetectionError::UnknownLabel { .. }));
}

#[test]
fn accepts_weapon_label_on_weapon_stream() {
    let p = payload(vec![object("handgun", 0.9, unit_box())]);
    validate_detection(DetectionStream::Weapon, &p, 256).expect("weapon stream accepts handgun");
}

proptest! {
    #[test]
    fn boxes_inside_unit_square_always_pass(
        x in 0.0f64..0.9,
        y in 0.0f64..0.9,
        frac_w in 0.01f64..1.0,
        frac_h in 0.01f64..1.0,
        confidence in 0.0f64..1.0,
    ) {
        // Shrink width/height into the remaining span so the rectangle stays
        // inside the unit square by construction.
        let w = (1.0 - x) * frac_w;
        let h = (1.0 - y) * frac_h;
        prop_assume!(w > 0.0 && h > 0.0);
        let bbox = BoundingBox { x, y, w, h };
        let p = payload(vec![object("person", confidence, bbox)]);
        prop_assert!(validate_detection(DetectionStream::Basic, &p, 256).is_ok());
    }

    #[test]
    fn boxes_escaping_the_unit_square_always_fail(
        x in 0.5f64..1.0,
        y in 0.0f64..0.9,
        w in 0.51f64..2.0,
        h in 0.01f64..0.5,
    ) {
        let bbox = BoundingBox { x, y, w, h };
        prop_assume!(x + w > 1.0);
        let p = payload(vec![object("person", 0.5, bbox)]);
        prop_assert!(matches!(
            validate_detection(DetectionStream::Basic, &p, 256),
            Err(DetectionError::InvalidBox(0))
        ));
    }
}
