// crates/vigil-core/src/core/detections.rs
// ============================================================================
// Module: Detection Payloads
// Description: AI detection payload shapes and write-side validation.
// Purpose: Reject malformed detections before they reach the hot store.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The AI collaborator posts per-camera detection payloads keyed by stream
//! kind. Validation happens entirely on the write path: payload size, object
//! count, the rectangle-in-unit-square predicate for every bounding box,
//! confidence range, and stream-matched label membership. Reads attach an
//! `age_ms` computed against the caller's clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted detection payload size in bytes.
pub const MAX_DETECTION_BYTES: usize = 8 * 1024;

/// Maximum objects per detection payload.
pub const MAX_DETECTION_OBJECTS: usize = 50;

/// Seconds a stored detection stays readable.
pub const DETECTION_TTL_SECS: u64 = 10;

/// Labels accepted on the basic stream.
pub const BASIC_CLASSES: &[&str] = &[
    "person",
    "car",
    "truck",
    "bus",
    "motorcycle",
    "bicycle",
    "dog",
    "cat",
    "backpack",
    "suitcase",
];

/// Labels accepted on the weapon stream.
pub const WEAPON_CLASSES: &[&str] = &["handgun", "rifle", "knife"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Detection stream kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStream {
    /// General object detection.
    Basic,
    /// Weapon detection.
    Weapon,
}

impl DetectionStream {
    /// Returns the stable stream label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Weapon => "weapon",
        }
    }

    /// Parses a stream label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "basic" => Some(Self::Basic),
            "weapon" => Some(Self::Weapon),
            _ => None,
        }
    }

    /// Returns the label set accepted on this stream.
    #[must_use]
    pub const fn class_set(self) -> &'static [&'static str] {
        match self {
            Self::Basic => BASIC_CLASSES,
            Self::Weapon => WEAPON_CLASSES,
        }
    }
}

/// A normalized bounding box in unit-square coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge in `[0, 1]`.
    pub x: f64,
    /// Top edge in `[0, 1]`.
    pub y: f64,
    /// Width; strictly positive.
    pub w: f64,
    /// Height; strictly positive.
    pub h: f64,
}

impl BoundingBox {
    /// Returns true when the box is a rectangle inside the unit square.
    #[must_use]
    pub fn in_unit_square(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.w > 0.0
            && self.h > 0.0
            && self.x + self.w <= 1.0
            && self.y + self.h <= 1.0
    }
}

/// One detected object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionObject {
    /// Class label; must belong to the stream's class set.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Normalized bounding box.
    pub bbox: BoundingBox,
}

/// A detection payload posted by the AI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPayload {
    /// Capture timestamp in Unix milliseconds.
    pub ts_unix_ms: i64,
    /// Detected objects.
    pub objects: Vec<DetectionObject>,
}

/// A stored detection as returned to readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDetection {
    /// The validated payload.
    #[serde(flatten)]
    pub payload: DetectionPayload,
    /// Milliseconds between capture and read.
    pub age_ms: i64,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Detection validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Payload exceeded [`MAX_DETECTION_BYTES`].
    #[error("detection payload exceeds {MAX_DETECTION_BYTES} bytes")]
    PayloadTooLarge,
    /// Too many objects.
    #[error("detection object count exceeds {MAX_DETECTION_OBJECTS}")]
    TooManyObjects,
    /// A bounding box violated the unit-square predicate.
    #[error("bounding box outside unit square at index {0}")]
    InvalidBox(usize),
    /// A confidence value was out of range.
    #[error("confidence out of range at index {0}")]
    InvalidConfidence(usize),
    /// A label did not belong to the stream's class set.
    #[error("label {label:?} not in the {stream} class set")]
    UnknownLabel {
        /// Offending label.
        label: String,
        /// Target stream label.
        stream: &'static str,
    },
}

/// Validates a detection payload for a stream.
///
/// # Errors
///
/// Returns the first [`DetectionError`] encountered.
pub fn validate_detection(
    stream: DetectionStream,
    payload: &DetectionPayload,
    encoded_len: usize,
) -> Result<(), DetectionError> {
    if encoded_len > MAX_DETECTION_BYTES {
        return Err(DetectionError::PayloadTooLarge);
    }
    if payload.objects.len() > MAX_DETECTION_OBJECTS {
        return Err(DetectionError::TooManyObjects);
    }
    for (index, object) in payload.objects.iter().enumerate() {
        if !object.bbox.in_unit_square() {
            return Err(DetectionError::InvalidBox(index));
        }
        if !(0.0..=1.0).contains(&object.confidence) {
            return Err(DetectionError::InvalidConfidence(index));
        }
        if !stream.class_set().contains(&object.label.as_str()) {
            return Err(DetectionError::UnknownLabel {
                label: object.label.clone(),
                stream: stream.as_str(),
            });
        }
    }
    Ok(())
}
