// crates/vigil-server/tests/rbac_checks.rs
// ============================================================================
// Module: RBAC Service Tests
// Description: Grant caching, scope semantics, and fail-closed loading.
// Purpose: Pin permission resolution at the service seam.
// Dependencies: vigil-server, vigil-core
// ============================================================================

//! RBAC resolver tests with a counting grant source.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use vigil_core::CheckTarget;
use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::Grant;
use vigil_core::GrantSet;
use vigil_core::GrantSource;
use vigil_core::SiteId;
use vigil_core::TenantId;
use vigil_core::UserId;
use vigil_server::auth::AuthContext;
use vigil_server::rbac::RbacService;

/// Grant source fake counting loads and scripting outages.
struct CountingSource {
    grants: GrantSet,
    loads: AtomicU32,
    down: AtomicBool,
}

impl GrantSource for CountingSource {
    fn load_grants(&self, _tenant: TenantId, _user: UserId) -> Result<GrantSet, DomainError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DomainError::unavailable("db_down", "scripted outage"));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.grants.clone())
    }
}

fn auth(tenant_id: TenantId) -> AuthContext {
    AuthContext {
        tenant_id,
        user_id: UserId::generate(),
        request_id: None,
        client_ip: None,
        user_agent: None,
    }
}

fn source_with(site: SiteId) -> Arc<CountingSource> {
    let mut grants = GrantSet::new();
    grants.add(
        "camera.view",
        Grant {
            tenant_wide: false,
            site_ids: [site].into_iter().collect(),
        },
    );
    grants.add(
        "user.manage",
        Grant {
            tenant_wide: true,
            site_ids: BTreeSet::new(),
        },
    );
    Arc::new(CountingSource {
        grants,
        loads: AtomicU32::new(0),
        down: AtomicBool::new(false),
    })
}

#[test]
fn site_grant_allows_its_site_only() {
    let site = SiteId::generate();
    let source = source_with(site);
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());

    rbac.require(&auth, "camera.view", CheckTarget::Site(site)).unwrap();
    let denied = rbac
        .require(&auth, "camera.view", CheckTarget::Site(SiteId::generate()))
        .unwrap_err();
    assert_eq!(denied.kind, ErrorKind::Permission);
    // Site-scoped grants never satisfy tenant scope.
    assert!(rbac.require(&auth, "camera.view", CheckTarget::Tenant).is_err());
}

#[test]
fn tenant_wide_grant_covers_every_scope() {
    let source = source_with(SiteId::generate());
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());
    rbac.require(&auth, "user.manage", CheckTarget::Tenant).unwrap();
    rbac.require(&auth, "user.manage", CheckTarget::Site(SiteId::generate())).unwrap();
}

#[test]
fn grants_are_cached_within_the_ttl_window() {
    let source = source_with(SiteId::generate());
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());

    for _ in 0..5 {
        rbac.require(&auth, "user.manage", CheckTarget::Tenant).unwrap();
    }
    assert_eq!(source.loads.load(Ordering::SeqCst), 1, "one load, four cache hits");
}

#[test]
fn invalidate_forces_a_reload() {
    let source = source_with(SiteId::generate());
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());

    rbac.require(&auth, "user.manage", CheckTarget::Tenant).unwrap();
    rbac.invalidate(auth.tenant_id, auth.user_id);
    rbac.require(&auth, "user.manage", CheckTarget::Tenant).unwrap();
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn source_outage_fails_closed() {
    let source = source_with(SiteId::generate());
    source.down.store(true, Ordering::SeqCst);
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());
    let err = rbac.require(&auth, "user.manage", CheckTarget::Tenant).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DependencyUnavailable);
}

#[test]
fn unknown_permission_is_denied() {
    let source = source_with(SiteId::generate());
    let rbac = RbacService::new(Arc::clone(&source) as Arc<dyn GrantSource>);
    let auth = auth(TenantId::generate());
    let denied = rbac.require(&auth, "camera.teleport", CheckTarget::Tenant).unwrap_err();
    assert_eq!(denied.kind, ErrorKind::Permission);
}
