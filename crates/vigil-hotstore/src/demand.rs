// crates/vigil-hotstore/src/demand.rs
// ============================================================================
// Module: Redis Demand Registry
// Description: Time-scored overlay demand set.
// Purpose: Track which cameras currently need AI overlays.
// Dependencies: redis, vigil-core
// ============================================================================

//! ## Overview
//! One sorted set maps camera id to its last-refresh unix-ms. The AI
//! collaborator reads the active slice; a periodic sweep trims members whose
//! score has aged past the demand TTL so the set stays small.

// ============================================================================
// SECTION: Imports
// ============================================================================

use vigil_core::CameraId;
use vigil_core::DemandRegistry;
use vigil_core::HotStoreError;
use vigil_core::OVERLAY_DEMAND_TTL_MS;

use crate::store::DEMAND_KEY;
use crate::store::HotStore;
use crate::store::redis_err;

impl DemandRegistry for HotStore {
    fn refresh(&self, camera_id: CameraId, now_ms: i64) -> Result<(), HotStoreError> {
        let mut conn = self.conn()?;
        redis::cmd("ZADD")
            .arg(DEMAND_KEY)
            .arg(now_ms)
            .arg(camera_id.to_string())
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn active_cameras(&self, now_ms: i64) -> Result<Vec<CameraId>, HotStoreError> {
        let mut conn = self.conn()?;
        let floor = now_ms - OVERLAY_DEMAND_TTL_MS + 1;
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(DEMAND_KEY)
            .arg(floor)
            .arg("+inf")
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        Ok(members.iter().filter_map(|member| member.parse().ok()).collect())
    }

    fn sweep(&self, now_ms: i64) -> Result<usize, HotStoreError> {
        let mut conn = self.conn()?;
        let ceiling = now_ms - OVERLAY_DEMAND_TTL_MS;
        let removed: usize = redis::cmd("ZREMRANGEBYSCORE")
            .arg(DEMAND_KEY)
            .arg("-inf")
            .arg(ceiling)
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        Ok(removed)
    }
}
