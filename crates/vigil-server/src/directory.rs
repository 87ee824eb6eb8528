// crates/vigil-server/src/directory.rs
// ============================================================================
// Module: Store-Backed User Directory
// Description: PostgresStore as the auth service's identity source.
// Purpose: Wire login and reset flows to the relational store.
// Dependencies: vigil-core, vigil-crypto, vigil-store
// ============================================================================

//! ## Overview
//! The auth service sees identity through the [`UserDirectory`] seam. The
//! Postgres implementation runs user lookups inside a tenant-bound
//! transaction and the tenant lookup globally (login happens before a
//! tenant scope exists).

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

use vigil_core::DomainError;
use vigil_core::Tenant;
use vigil_core::TenantId;
use vigil_core::User;
use vigil_core::UserId;
use vigil_store::PostgresStore;
use vigil_store::users;

use crate::auth::UserDirectory;

impl UserDirectory for PostgresStore {
    fn find_tenant(&self, name: &str) -> Result<Option<Tenant>, DomainError> {
        self.with_global(|tx| users::find_tenant_by_name(tx, name)).map_err(DomainError::from)
    }

    fn find_user(&self, tenant_id: TenantId, email: &str) -> Result<Option<User>, DomainError> {
        self.with_tenant(tenant_id, |tx| users::find_user_by_email(tx, email))
            .map_err(DomainError::from)
    }

    fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>, DomainError> {
        self.with_tenant(tenant_id, |tx| users::get_user(tx, user_id)).map_err(DomainError::from)
    }

    fn set_password(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        password_algo: &str,
    ) -> Result<(), DomainError> {
        self.with_tenant(tenant_id, |tx| {
            users::set_password(
                tx,
                user_id,
                password_hash,
                password_algo,
                OffsetDateTime::now_utc(),
            )
        })
        .map_err(DomainError::from)
    }
}
