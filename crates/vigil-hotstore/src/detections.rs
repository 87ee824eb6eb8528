// crates/vigil-hotstore/src/detections.rs
// ============================================================================
// Module: Redis Detection Cache
// Description: Stream-keyed latest-detection storage with a short TTL.
// Purpose: Serve the freshest validated detection per camera stream.
// Dependencies: redis, serde_json, vigil-core
// ============================================================================

//! ## Overview
//! One key per `(tenant, camera, stream)` holds the latest validated
//! payload under the detection TTL. Reads attach `age_ms` against the
//! payload's capture timestamp; the server TTL guarantees nothing stale
//! survives past the window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use vigil_core::CameraId;
use vigil_core::DETECTION_TTL_SECS;
use vigil_core::DetectionCache;
use vigil_core::DetectionPayload;
use vigil_core::DetectionStream;
use vigil_core::HotStoreError;
use vigil_core::StoredDetection;
use vigil_core::TenantId;

use crate::store::HotStore;
use crate::store::detection_key;
use crate::store::redis_err;

impl DetectionCache for HotStore {
    fn put(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        payload: &DetectionPayload,
        _now_ms: i64,
    ) -> Result<(), HotStoreError> {
        let mut conn = self.conn()?;
        let record = serde_json::to_string(payload)
            .map_err(|err| HotStoreError::Corrupt(err.to_string()))?;
        redis::cmd("SET")
            .arg(detection_key(tenant_id, camera_id, stream))
            .arg(record)
            .arg("EX")
            .arg(DETECTION_TTL_SECS)
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn latest(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        now_ms: i64,
    ) -> Result<Option<StoredDetection>, HotStoreError> {
        let mut conn = self.conn()?;
        let record: Option<String> = redis::cmd("GET")
            .arg(detection_key(tenant_id, camera_id, stream))
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        record
            .map(|record| {
                let payload: DetectionPayload = serde_json::from_str(&record)
                    .map_err(|err| HotStoreError::Corrupt(err.to_string()))?;
                Ok(StoredDetection {
                    age_ms: now_ms - payload.ts_unix_ms,
                    payload,
                })
            })
            .transpose()
    }
}
