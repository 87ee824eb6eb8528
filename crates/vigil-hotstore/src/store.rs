// crates/vigil-hotstore/src/store.rs
// ============================================================================
// Module: Redis Hot Store
// Description: Pooled Redis access and the shared key layout.
// Purpose: Back the ephemeral control-plane state: sessions, demand,
//          detections, rate windows, and opaque tokens.
// Dependencies: r2d2, redis
// ============================================================================

//! ## Overview
//! One pooled Redis client backs every hot-store trait implementation. Keys
//! are tenant-prefixed wherever the data is tenant-scoped, and all expiry is
//! server-side TTL so a crashed control plane leaves nothing behind. The
//! key layout lives here so every module composes keys the same way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use r2d2::Pool;
use r2d2::PooledConnection;

use vigil_core::CameraId;
use vigil_core::DetectionStream;
use vigil_core::HotStoreError;
use vigil_core::SessionId;
use vigil_core::TenantId;
use vigil_core::UserId;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Pooled Redis hot store.
#[derive(Clone)]
pub struct HotStore {
    /// Connection pool.
    pool: Pool<redis::Client>,
}

impl HotStore {
    /// Connects the pool against a Redis URL.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError::Unavailable`] when the URL is malformed or
    /// the pool cannot initialize.
    pub fn connect(url: &str, max_connections: u32) -> Result<Self, HotStoreError> {
        let client = redis::Client::open(url)
            .map_err(|err| HotStoreError::Unavailable(err.to_string()))?;
        let pool = Pool::builder()
            .max_size(max_connections)
            .build(client)
            .map_err(|err| HotStoreError::Unavailable(err.to_string()))?;
        Ok(Self {
            pool,
        })
    }

    /// Checks out a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError::Unavailable`] when the pool is exhausted or
    /// the server is unreachable.
    pub(crate) fn conn(&self) -> Result<PooledConnection<redis::Client>, HotStoreError> {
        self.pool.get().map_err(|err| HotStoreError::Unavailable(err.to_string()))
    }
}

/// Maps a Redis failure onto the hot-store error shape.
pub(crate) fn redis_err(err: &redis::RedisError) -> HotStoreError {
    HotStoreError::Unavailable(err.to_string())
}

// ============================================================================
// SECTION: Key Layout
// ============================================================================

/// Key of a viewer session record.
#[must_use]
pub fn session_key(session_id: SessionId) -> String {
    format!("live:sess:{session_id}")
}

/// Key of the `(user, camera)` idempotency marker.
#[must_use]
pub fn idempotency_key(tenant_id: TenantId, user_id: UserId, camera_id: CameraId) -> String {
    format!("live:idem:{tenant_id}:{user_id}:{camera_id}")
}

/// Key of a user's active-session set.
#[must_use]
pub fn active_set_key(tenant_id: TenantId, user_id: UserId) -> String {
    format!("live:active:{tenant_id}:{user_id}")
}

/// Key of the overlay demand sorted set.
pub const DEMAND_KEY: &str = "overlay:demand";

/// Key of the latest detection for a camera stream.
#[must_use]
pub fn detection_key(tenant_id: TenantId, camera_id: CameraId, stream: DetectionStream) -> String {
    format!("det:latest:{tenant_id}:{camera_id}:{}", stream.as_str())
}

/// Key of a fixed rate-limit window counter.
#[must_use]
pub fn rate_key(scope: &str) -> String {
    format!("rate:{scope}")
}

/// Key of a stored refresh-token hash.
#[must_use]
pub fn refresh_token_key(token_hash: &str) -> String {
    format!("auth:refresh:{token_hash}")
}

/// Key of a stored password-reset token hash.
#[must_use]
pub fn reset_token_key(token_hash: &str) -> String {
    format!("auth:reset:{token_hash}")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn keys_are_tenant_prefixed_where_scoped() {
        let tenant = TenantId::generate();
        let user = UserId::generate();
        let camera = CameraId::generate();
        assert!(active_set_key(tenant, user).starts_with(&format!("live:active:{tenant}:")));
        assert!(
            detection_key(tenant, camera, DetectionStream::Weapon)
                .ends_with(&format!("{camera}:weapon"))
        );
        assert!(idempotency_key(tenant, user, camera).contains(&tenant.to_string()));
    }
}
