// crates/vigil-server/src/rbac.rs
// ============================================================================
// Module: RBAC Enforcement
// Description: Permission resolution with the bounded grant cache.
// Purpose: Decide every request's permission question exactly one way.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! The resolver loads grants through the [`GrantSource`] seam, caches them
//! for one TTL window, and answers checks with the core grant semantics.
//! Denials carry no information about target existence; controllers pair a
//! deny with not-found where leakage matters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use vigil_core::CheckTarget;
use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::GrantCache;
use vigil_core::GrantSet;
use vigil_core::GrantSource;
use vigil_core::TenantId;
use vigil_core::UserId;

use crate::auth::AuthContext;

// ============================================================================
// SECTION: Service
// ============================================================================

/// RBAC resolver with the bounded cache.
pub struct RbacService {
    /// Grant loading seam (Postgres in production).
    source: Arc<dyn GrantSource>,
    /// Bounded 60-second cache.
    cache: GrantCache,
}

impl RbacService {
    /// Builds the service.
    #[must_use]
    pub fn new(source: Arc<dyn GrantSource>) -> Self {
        Self {
            source,
            cache: GrantCache::new(),
        }
    }

    /// Resolves the caller's grant set, via cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the grant source is down; RBAC is
    /// an auth path and fails closed.
    pub fn grants(&self, tenant_id: TenantId, user_id: UserId) -> Result<GrantSet, DomainError> {
        let now = Instant::now();
        if let Some(grants) = self.cache.get(tenant_id, user_id, now) {
            return Ok(grants);
        }
        let grants = self.source.load_grants(tenant_id, user_id)?;
        self.cache.put(tenant_id, user_id, grants.clone(), now);
        Ok(grants)
    }

    /// Requires a permission against a resolved target.
    ///
    /// # Errors
    ///
    /// Returns a permission failure when the grant is missing.
    pub fn require(
        &self,
        auth: &AuthContext,
        permission: &str,
        target: CheckTarget,
    ) -> Result<(), DomainError> {
        let grants = self.grants(auth.tenant_id, auth.user_id)?;
        if grants.allows(permission, target) {
            return Ok(());
        }
        Err(DomainError::new(
            ErrorKind::Permission,
            "permission_denied",
            format!("missing {permission}"),
        ))
    }

    /// Drops a user's cached grants after a role change.
    pub fn invalidate(&self, tenant_id: TenantId, user_id: UserId) {
        self.cache.invalidate(tenant_id, user_id);
    }
}
