// crates/vigil-hotstore/src/rate.rs
// ============================================================================
// Module: Redis Rate Windows
// Description: Fixed-window counters for per-session rate limits.
// Purpose: Bound telemetry ingest without process-local state.
// Dependencies: redis, vigil-core
// ============================================================================

//! ## Overview
//! Each scope gets an `INCR`ed counter whose key expires at the end of its
//! window. The first increment sets the expiry, so a window's counter and
//! its lifetime start together.

// ============================================================================
// SECTION: Imports
// ============================================================================

use vigil_core::HotStoreError;
use vigil_core::RateWindow;

use crate::store::HotStore;
use crate::store::rate_key;
use crate::store::redis_err;

impl RateWindow for HotStore {
    fn increment(&self, key: &str, window_secs: u64, _now_ms: i64) -> Result<u32, HotStoreError> {
        let mut conn = self.conn()?;
        let key = rate_key(key);
        let count: u32 =
            redis::cmd("INCR").arg(&key).query(&mut *conn).map_err(|err| redis_err(&err))?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query::<()>(&mut *conn)
                .map_err(|err| redis_err(&err))?;
        }
        Ok(count)
    }
}
