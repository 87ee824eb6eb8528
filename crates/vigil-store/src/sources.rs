// crates/vigil-store/src/sources.rs
// ============================================================================
// Module: Core Interface Implementations
// Description: PostgresStore as grant source and usage provider.
// Purpose: Satisfy the core trait seams RBAC and the license gate consume.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! The RBAC resolver and license gate only know the [`GrantSource`] and
//! [`UsageProvider`] traits. Both implementations here run inside a
//! tenant-bound transaction, so RLS scopes the underlying queries exactly
//! like every other store access.

// ============================================================================
// SECTION: Imports
// ============================================================================

use vigil_core::DomainError;
use vigil_core::GrantSet;
use vigil_core::GrantSource;
use vigil_core::TenantId;
use vigil_core::UsageProvider;
use vigil_core::UserId;

use crate::cameras;
use crate::nvrs;
use crate::store::PostgresStore;
use crate::users;

impl GrantSource for PostgresStore {
    fn load_grants(&self, tenant_id: TenantId, user_id: UserId) -> Result<GrantSet, DomainError> {
        self.with_tenant(tenant_id, |tx| users::load_grants(tx, user_id))
            .map_err(DomainError::from)
    }
}

impl UsageProvider for PostgresStore {
    fn camera_count(&self, tenant_id: TenantId) -> Result<u32, DomainError> {
        self.with_tenant(tenant_id, cameras::camera_count).map_err(DomainError::from)
    }

    fn nvr_count(&self, tenant_id: TenantId) -> Result<u32, DomainError> {
        self.with_tenant(tenant_id, nvrs::nvr_count).map_err(DomainError::from)
    }
}
