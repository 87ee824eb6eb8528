// crates/vigil-hotstore/src/tokens.rs
// ============================================================================
// Module: Redis Token Store
// Description: Single-use refresh and password-reset token records.
// Purpose: Back the identity flows with hash-keyed, TTL-bound tokens.
// Dependencies: redis, vigil-core
// ============================================================================

//! ## Overview
//! Tokens are stored by hash with the subject as the value and a server-side
//! TTL. Consumption uses `GETDEL`, so a token can be redeemed exactly once
//! even under concurrent refresh attempts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::HotStoreError;
use vigil_core::TenantId;
use vigil_core::TokenStore;
use vigil_core::UserId;

use crate::store::HotStore;
use crate::store::redis_err;
use crate::store::refresh_token_key;
use crate::store::reset_token_key;

/// Stores a subject under a key with a TTL.
fn store_subject(
    store: &HotStore,
    key: String,
    tenant_id: TenantId,
    user_id: UserId,
    ttl_secs: u64,
) -> Result<(), HotStoreError> {
    let mut conn = store.conn()?;
    redis::cmd("SET")
        .arg(key)
        .arg(format!("{tenant_id}:{user_id}"))
        .arg("EX")
        .arg(ttl_secs)
        .query::<()>(&mut *conn)
        .map_err(|err| redis_err(&err))
}

/// Consumes a subject with `GETDEL`, parsing the `(tenant, user)` pair.
fn take_subject(
    store: &HotStore,
    key: String,
) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
    let mut conn = store.conn()?;
    let value: Option<String> =
        redis::cmd("GETDEL").arg(key).query(&mut *conn).map_err(|err| redis_err(&err))?;
    let Some(value) = value else {
        return Ok(None);
    };
    let Some((tenant, user)) = value.split_once(':') else {
        return Err(HotStoreError::Corrupt("token subject".to_string()));
    };
    let tenant = tenant
        .parse::<Uuid>()
        .map_err(|_| HotStoreError::Corrupt("token tenant".to_string()))?;
    let user =
        user.parse::<Uuid>().map_err(|_| HotStoreError::Corrupt("token user".to_string()))?;
    Ok(Some((TenantId::new(tenant), UserId::new(user))))
}

impl TokenStore for HotStore {
    fn store_refresh(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        _now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        store_subject(self, refresh_token_key(token_hash), tenant_id, user_id, ttl_secs)
    }

    fn take_refresh(
        &self,
        token_hash: &str,
        _now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
        take_subject(self, refresh_token_key(token_hash))
    }

    fn store_reset(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        _now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        store_subject(self, reset_token_key(token_hash), tenant_id, user_id, ttl_secs)
    }

    fn take_reset(
        &self,
        token_hash: &str,
        _now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
        take_subject(self, reset_token_key(token_hash))
    }
}
