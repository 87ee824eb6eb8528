// crates/vigil-hotstore/src/sessions.rs
// ============================================================================
// Module: Redis Session Store
// Description: Viewer session records, idempotency keys, and active sets.
// Purpose: Implement the broker's session seam with server-side TTLs.
// Dependencies: redis, serde_json, vigil-core
// ============================================================================

//! ## Overview
//! Session creation is one atomic `MULTI`/`EXEC` pipeline covering the
//! session record, the idempotency marker, and the active-set membership.
//! Expiry is TTL-driven on the server, so `get` treats a missing key as an
//! expired session and the scrubber drops active-set members whose record
//! key no longer exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

use vigil_core::CameraId;
use vigil_core::HotStoreError;
use vigil_core::IDEMPOTENCY_WINDOW_SECS;
use vigil_core::SESSION_TTL_SECS;
use vigil_core::SessionId;
use vigil_core::SessionStore;
use vigil_core::TenantId;
use vigil_core::UserId;
use vigil_core::ViewerSession;

use crate::store::HotStore;
use crate::store::active_set_key;
use crate::store::idempotency_key;
use crate::store::redis_err;
use crate::store::session_key;

impl SessionStore for HotStore {
    fn create_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut conn = self.conn()?;
        let record = serde_json::to_string(session)
            .map_err(|err| HotStoreError::Corrupt(err.to_string()))?;
        let session_id = session.session_id.to_string();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(session_key(session.session_id))
            .arg(&record)
            .arg("EX")
            .arg(SESSION_TTL_SECS)
            .ignore()
            .cmd("SET")
            .arg(idempotency_key(session.tenant_id, session.user_id, session.camera_id))
            .arg(&session_id)
            .arg("EX")
            .arg(IDEMPOTENCY_WINDOW_SECS)
            .ignore()
            .cmd("SADD")
            .arg(active_set_key(session.tenant_id, session.user_id))
            .arg(&session_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(active_set_key(session.tenant_id, session.user_id))
            .arg(SESSION_TTL_SECS)
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn get_session(
        &self,
        session_id: SessionId,
        _now: OffsetDateTime,
    ) -> Result<Option<ViewerSession>, HotStoreError> {
        let mut conn = self.conn()?;
        let record: Option<String> = redis::cmd("GET")
            .arg(session_key(session_id))
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        record
            .map(|record| {
                serde_json::from_str(&record)
                    .map_err(|err| HotStoreError::Corrupt(err.to_string()))
            })
            .transpose()
    }

    fn update_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut conn = self.conn()?;
        let record = serde_json::to_string(session)
            .map_err(|err| HotStoreError::Corrupt(err.to_string()))?;
        // KEEPTTL preserves the record's current expiry.
        redis::cmd("SET")
            .arg(session_key(session.session_id))
            .arg(record)
            .arg("KEEPTTL")
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn extend_session(
        &self,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        let Some(mut session) = self.get_session(session_id, now)? else {
            return Ok(());
        };
        session.last_seen_at = now;
        session.expires_at = now + time::Duration::seconds(SESSION_TTL_SECS as i64);
        let mut conn = self.conn()?;
        let record = serde_json::to_string(&session)
            .map_err(|err| HotStoreError::Corrupt(err.to_string()))?;
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(session_key(session_id))
            .arg(record)
            .arg("EX")
            .arg(SESSION_TTL_SECS)
            .ignore()
            .cmd("EXPIRE")
            .arg(active_set_key(session.tenant_id, session.user_id))
            .arg(SESSION_TTL_SECS)
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn remove_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut conn = self.conn()?;
        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(session_key(session.session_id))
            .ignore()
            .cmd("SREM")
            .arg(active_set_key(session.tenant_id, session.user_id))
            .arg(session.session_id.to_string())
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(|err| redis_err(&err))
    }

    fn idempotent_session(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        camera_id: CameraId,
        _now: OffsetDateTime,
    ) -> Result<Option<SessionId>, HotStoreError> {
        let mut conn = self.conn()?;
        let marker: Option<String> = redis::cmd("GET")
            .arg(idempotency_key(tenant_id, user_id, camera_id))
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        let Some(marker) = marker else {
            return Ok(None);
        };
        let session_id: SessionId =
            marker.parse().map_err(|_| HotStoreError::Corrupt("session id".to_string()))?;
        // The marker may outlive a removed session; require the record too.
        let exists: bool = redis::cmd("EXISTS")
            .arg(session_key(session_id))
            .query(&mut *conn)
            .map_err(|err| redis_err(&err))?;
        Ok(exists.then_some(session_id))
    }

    fn scrub_active(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        _now: OffsetDateTime,
    ) -> Result<Vec<SessionId>, HotStoreError> {
        let mut conn = self.conn()?;
        let key = active_set_key(tenant_id, user_id);
        let members: Vec<String> =
            redis::cmd("SMEMBERS").arg(&key).query(&mut *conn).map_err(|err| redis_err(&err))?;
        let mut live = Vec::with_capacity(members.len());
        for member in members {
            let Ok(session_id) = member.parse::<SessionId>() else {
                redis::cmd("SREM")
                    .arg(&key)
                    .arg(&member)
                    .query::<()>(&mut *conn)
                    .map_err(|err| redis_err(&err))?;
                continue;
            };
            let exists: bool = redis::cmd("EXISTS")
                .arg(session_key(session_id))
                .query(&mut *conn)
                .map_err(|err| redis_err(&err))?;
            if exists {
                live.push(session_id);
            } else {
                redis::cmd("SREM")
                    .arg(&key)
                    .arg(&member)
                    .query::<()>(&mut *conn)
                    .map_err(|err| redis_err(&err))?;
            }
        }
        Ok(live)
    }
}
