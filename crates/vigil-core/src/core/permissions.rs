// crates/vigil-core/src/core/permissions.rs
// ============================================================================
// Module: RBAC Permission Model
// Description: Permission catalog, grant resolution, and the bounded cache.
// Purpose: Decide whether a user may act on a tenant, site, or camera scope.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! A user's effective permissions are the union of grants over their role
//! assignments. Each grant is either tenant-wide or bound to a set of sites;
//! tenant-wide always dominates a site list. Camera-scoped checks resolve the
//! camera's site first and then apply site semantics, so the checker itself
//! only distinguishes tenant and site targets.
//!
//! ## Invariants
//! - The permission catalog is fixed at schema seed; unknown names never match.
//! - Cache entries expire after [`GRANT_CACHE_TTL`]; a stale read is bounded
//!   to one TTL window.
//! - The cache never exceeds [`GRANT_CACHE_CAP`] entries; overflow evicts a
//!   random entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::SiteId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// The fixed permission catalog, seeded at schema creation.
pub const PERMISSION_CATALOG: &[&str] = &[
    "camera.view",
    "camera.create",
    "camera.update",
    "camera.delete",
    "camera.control",
    "nvr.view",
    "nvr.manage",
    "discovery.run",
    "health.view",
    "live.view",
    "live.overlay",
    "audit.view",
    "audit.export",
    "license.view",
    "license.manage",
    "user.manage",
    "role.manage",
    "site.manage",
    "telemetry.write",
];

/// Returns true when the permission name is part of the fixed catalog.
#[must_use]
pub fn is_known_permission(name: &str) -> bool {
    PERMISSION_CATALOG.contains(&name)
}

// ============================================================================
// SECTION: Grants
// ============================================================================

/// A single resolved grant for one permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Whether the grant applies tenant-wide.
    pub tenant_wide: bool,
    /// Sites the grant applies to when not tenant-wide.
    pub site_ids: BTreeSet<SiteId>,
}

impl Grant {
    /// Merges another grant for the same permission into this one.
    pub fn merge(&mut self, other: &Self) {
        self.tenant_wide = self.tenant_wide || other.tenant_wide;
        if !self.tenant_wide {
            self.site_ids.extend(other.site_ids.iter().copied());
        }
    }
}

/// Target of a permission check after camera-to-site resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTarget {
    /// Tenant-scoped operation; requires a tenant-wide grant.
    Tenant,
    /// Site-scoped operation (including resolved camera scopes).
    Site(SiteId),
}

/// The effective permission set for one `(tenant, user)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSet {
    /// Permission name to merged grant.
    grants: BTreeMap<String, Grant>,
}

impl GrantSet {
    /// Creates an empty grant set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a grant, merging with any existing grant for the permission.
    pub fn add(&mut self, permission: impl Into<String>, grant: Grant) {
        let permission = permission.into();
        if !is_known_permission(&permission) {
            return;
        }
        self.grants.entry(permission).or_default().merge(&grant);
    }

    /// Returns the merged grant for a permission, when present.
    #[must_use]
    pub fn grant(&self, permission: &str) -> Option<&Grant> {
        self.grants.get(permission)
    }

    /// Decides whether the set allows a permission against a target.
    #[must_use]
    pub fn allows(&self, permission: &str, target: CheckTarget) -> bool {
        let Some(grant) = self.grants.get(permission) else {
            return false;
        };
        match target {
            CheckTarget::Tenant => grant.tenant_wide,
            CheckTarget::Site(site_id) => grant.tenant_wide || grant.site_ids.contains(&site_id),
        }
    }

    /// Returns the number of distinct granted permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Returns true when no permissions are granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

// ============================================================================
// SECTION: Bounded Cache
// ============================================================================

/// Time-to-live for cached grant sets.
pub const GRANT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maximum cached `(tenant, user)` entries.
pub const GRANT_CACHE_CAP: usize = 1000;

/// One cached entry with its load time.
#[derive(Debug, Clone)]
struct CachedGrants {
    /// The cached grant set.
    grants: GrantSet,
    /// When the entry was loaded.
    loaded_at: Instant,
}

/// Bounded, transparent cache of resolved grant sets.
///
/// # Invariants
/// - Entries past the TTL are treated as absent.
/// - Insertion past capacity evicts one random entry first.
#[derive(Debug, Default)]
pub struct GrantCache {
    /// Cached entries keyed by `(tenant, user)`.
    entries: Mutex<HashMap<(TenantId, UserId), CachedGrants>>,
}

impl GrantCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached grant set when present and fresh.
    #[must_use]
    pub fn get(&self, tenant_id: TenantId, user_id: UserId, now: Instant) -> Option<GrantSet> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(&(tenant_id, user_id))?;
        if now.duration_since(cached.loaded_at) >= GRANT_CACHE_TTL {
            return None;
        }
        Some(cached.grants.clone())
    }

    /// Stores a freshly resolved grant set, evicting randomly past capacity.
    pub fn put(&self, tenant_id: TenantId, user_id: UserId, grants: GrantSet, now: Instant) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= GRANT_CACHE_CAP && !entries.contains_key(&(tenant_id, user_id)) {
            let index = rand::thread_rng().gen_range(0..entries.len());
            if let Some(victim) = entries.keys().nth(index).copied() {
                entries.remove(&victim);
            }
        }
        entries.insert(
            (tenant_id, user_id),
            CachedGrants {
                grants,
                loaded_at: now,
            },
        );
    }

    /// Drops the cached entry for a user, forcing the next check to reload.
    pub fn invalidate(&self, tenant_id: TenantId, user_id: UserId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(tenant_id, user_id));
        }
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    fn site_grant(site: SiteId) -> Grant {
        Grant {
            tenant_wide: false,
            site_ids: [site].into_iter().collect(),
        }
    }

    #[test]
    fn tenant_scope_requires_tenant_wide() {
        let site = SiteId::generate();
        let mut grants = GrantSet::new();
        grants.add("camera.view", site_grant(site));
        assert!(!grants.allows("camera.view", CheckTarget::Tenant));
        assert!(grants.allows("camera.view", CheckTarget::Site(site)));
    }

    #[test]
    fn tenant_wide_beats_site_list() {
        let mut grants = GrantSet::new();
        grants.add(
            "camera.view",
            Grant {
                tenant_wide: true,
                site_ids: BTreeSet::new(),
            },
        );
        assert!(grants.allows("camera.view", CheckTarget::Tenant));
        assert!(grants.allows("camera.view", CheckTarget::Site(SiteId::generate())));
    }

    #[test]
    fn merge_unions_site_lists() {
        let first = SiteId::generate();
        let second = SiteId::generate();
        let mut grants = GrantSet::new();
        grants.add("camera.view", site_grant(first));
        grants.add("camera.view", site_grant(second));
        assert!(grants.allows("camera.view", CheckTarget::Site(first)));
        assert!(grants.allows("camera.view", CheckTarget::Site(second)));
    }

    #[test]
    fn unknown_permission_never_grants() {
        let mut grants = GrantSet::new();
        grants.add(
            "camera.reboot",
            Grant {
                tenant_wide: true,
                site_ids: BTreeSet::new(),
            },
        );
        assert!(grants.is_empty());
        assert!(!grants.allows("camera.reboot", CheckTarget::Tenant));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = GrantCache::new();
        let tenant = TenantId::generate();
        let user = UserId::generate();
        let loaded = Instant::now();
        cache.put(tenant, user, GrantSet::new(), loaded);
        assert!(cache.get(tenant, user, loaded).is_some());
        let later = loaded + GRANT_CACHE_TTL + Duration::from_millis(1);
        assert!(cache.get(tenant, user, later).is_none());
    }

    #[test]
    fn cache_stays_bounded_under_churn() {
        let cache = GrantCache::new();
        let tenant = TenantId::generate();
        let now = Instant::now();
        for _ in 0..(GRANT_CACHE_CAP + 100) {
            cache.put(tenant, UserId::generate(), GrantSet::new(), now);
        }
        assert!(cache.len() <= GRANT_CACHE_CAP);
    }

    #[test]
    fn invalidate_drops_entry() {
        let cache = GrantCache::new();
        let tenant = TenantId::generate();
        let user = UserId::generate();
        let now = Instant::now();
        cache.put(tenant, user, GrantSet::new(), now);
        cache.invalidate(tenant, user);
        assert!(cache.get(tenant, user, now).is_none());
    }
}
