// crates/vigil-server/src/overlay.rs
// ============================================================================
// Module: Overlay Demand & Detections
// Description: Demand registry service and detection cache validation.
// Purpose: Drive AI fan-out from live viewer demand and serve the freshest
//          validated detections.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! Enabling an overlay refreshes the camera's demand score; the AI
//! collaborator polls the active slice and produces detections only for
//! cameras someone is watching. Detections validate fully on the write path
//! and read back with their age attached. A periodic sweep keeps the demand
//! set bounded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use vigil_core::CameraId;
use vigil_core::DemandRegistry;
use vigil_core::DetectionCache;
use vigil_core::DetectionPayload;
use vigil_core::DetectionStream;
use vigil_core::DomainError;
use vigil_core::StoredDetection;
use vigil_core::TenantId;
use vigil_core::validate_detection;

use crate::workers::Shutdown;
use crate::workers::spawn_worker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Demand sweep interval.
pub const DEMAND_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Service
// ============================================================================

/// Overlay demand and detection service.
pub struct OverlayService {
    /// Demand registry seam.
    demand: Arc<dyn DemandRegistry>,
    /// Detection cache seam.
    detections: Arc<dyn DetectionCache>,
}

impl OverlayService {
    /// Builds the service.
    #[must_use]
    pub fn new(demand: Arc<dyn DemandRegistry>, detections: Arc<dyn DetectionCache>) -> Self {
        Self {
            demand,
            detections,
        }
    }

    /// Records overlay demand for a camera.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the hot store is down.
    pub fn refresh_demand(
        &self,
        camera_id: CameraId,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        self.demand.refresh(camera_id, unix_ms(now)).map_err(DomainError::from)
    }

    /// Returns the cameras with live overlay demand.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the hot store is down.
    pub fn active_cameras(&self, now: OffsetDateTime) -> Result<Vec<CameraId>, DomainError> {
        self.demand.active_cameras(unix_ms(now)).map_err(DomainError::from)
    }

    /// Validates and stores a detection payload.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for malformed payloads and a dependency
    /// failure when the hot store is down.
    pub fn put_detection(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        payload: &DetectionPayload,
        encoded_len: usize,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        validate_detection(stream, payload, encoded_len)
            .map_err(|err| DomainError::validation("payload", err.to_string()))?;
        self.detections
            .put(tenant_id, camera_id, stream, payload, unix_ms(now))
            .map_err(DomainError::from)
    }

    /// Reads the latest detection with its age attached.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the hot store is down.
    pub fn latest_detection(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        now: OffsetDateTime,
    ) -> Result<Option<StoredDetection>, DomainError> {
        self.detections
            .latest(tenant_id, camera_id, stream, unix_ms(now))
            .map_err(DomainError::from)
    }

    /// Trims stale demand members; returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the hot store is down.
    pub fn sweep_demand(&self, now: OffsetDateTime) -> Result<usize, DomainError> {
        self.demand.sweep(unix_ms(now)).map_err(DomainError::from)
    }
}

/// Converts a timestamp into unix milliseconds.
fn unix_ms(now: OffsetDateTime) -> i64 {
    i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Sweep Worker
// ============================================================================

/// Spawns the periodic demand sweep.
pub fn spawn_demand_sweeper(
    service: Arc<OverlayService>,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    spawn_worker("overlay-sweep", DEMAND_SWEEP_INTERVAL, shutdown, move || {
        let service = Arc::clone(&service);
        async move {
            match service.sweep_demand(OffsetDateTime::now_utc()) {
                Ok(dropped) if dropped > 0 => {
                    tracing::debug!(dropped, "overlay demand sweep");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "overlay demand sweep failed"),
            }
        }
    })
}
