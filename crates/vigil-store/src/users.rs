// crates/vigil-store/src/users.rs
// ============================================================================
// Module: Identity Repository
// Description: Tenant, site, user, role, and grant SQL.
// Purpose: Persist identity and resolve effective RBAC grants.
// Dependencies: postgres, vigil-core
// ============================================================================

//! ## Overview
//! Tenant bootstrap is the only global write; everything else runs inside a
//! tenant-bound transaction. Role grants use a composite primary key so
//! assignment is idempotent, and grant resolution joins grants through role
//! permissions into the merged [`GrantSet`] shape the RBAC checker consumes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::Grant;
use vigil_core::GrantScope;
use vigil_core::GrantSet;
use vigil_core::Role;
use vigil_core::RoleId;
use vigil_core::Site;
use vigil_core::SiteId;
use vigil_core::Tenant;
use vigil_core::TenantId;
use vigil_core::User;
use vigil_core::UserId;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Tenants
// ============================================================================

/// Creates a tenant (global operation).
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate names.
pub fn create_tenant(
    tx: &mut Transaction<'_>,
    name: &str,
    now: OffsetDateTime,
) -> Result<Tenant, PgStoreError> {
    let id = TenantId::generate();
    tx.execute(
        "INSERT INTO tenants (id, name, created_at) VALUES ($1, $2, $3)",
        &[&id.as_uuid(), &name, &now],
    )?;
    Ok(Tenant {
        id,
        name: name.to_string(),
        created_at: now,
    })
}

/// Lists every tenant (global operation, used by background workers).
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_tenants(tx: &mut Transaction<'_>) -> Result<Vec<Tenant>, PgStoreError> {
    let rows = tx.query("SELECT id, name, created_at FROM tenants ORDER BY name", &[])?;
    rows.iter()
        .map(|row| {
            Ok(Tenant {
                id: TenantId::new(row.try_get::<_, Uuid>("id")?),
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// Finds a tenant by name (global operation, used by login).
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn find_tenant_by_name(
    tx: &mut Transaction<'_>,
    name: &str,
) -> Result<Option<Tenant>, PgStoreError> {
    let row = tx.query_opt(
        "SELECT id, name, created_at FROM tenants WHERE name = $1",
        &[&name],
    )?;
    row.map(|row| {
        Ok(Tenant {
            id: TenantId::new(row.try_get::<_, Uuid>("id")?),
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .transpose()
}

// ============================================================================
// SECTION: Sites
// ============================================================================

/// Creates a site for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate names.
pub fn create_site(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    name: &str,
    now: OffsetDateTime,
) -> Result<Site, PgStoreError> {
    let id = SiteId::generate();
    tx.execute(
        "INSERT INTO sites (id, tenant_id, name, created_at) VALUES ($1, $2, $3, $4)",
        &[&id.as_uuid(), &tenant_id.as_uuid(), &name, &now],
    )?;
    Ok(Site {
        id,
        tenant_id,
        name: name.to_string(),
        created_at: now,
    })
}

/// Lists sites for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn list_sites(tx: &mut Transaction<'_>) -> Result<Vec<Site>, PgStoreError> {
    let rows = tx.query("SELECT id, tenant_id, name, created_at FROM sites ORDER BY name", &[])?;
    rows.iter()
        .map(|row| {
            Ok(Site {
                id: SiteId::new(row.try_get::<_, Uuid>("id")?),
                tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Users
// ============================================================================

/// Maps a user row into its domain shape.
fn user_from_row(row: &Row) -> Result<User, PgStoreError> {
    Ok(User {
        id: UserId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        password_algo: row.try_get("password_algo")?,
        password_updated_at: row.try_get("password_updated_at")?,
        disabled: row.try_get("disabled")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// User columns shared by every select.
const USER_COLUMNS: &str = "id, tenant_id, email, password_hash, password_algo, \
                            password_updated_at, disabled, deleted_at, created_at";

/// Creates a user for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate live emails.
pub fn create_user(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    email: &str,
    password_hash: &str,
    password_algo: &str,
    now: OffsetDateTime,
) -> Result<User, PgStoreError> {
    let id = UserId::generate();
    tx.execute(
        "INSERT INTO users (id, tenant_id, email, password_hash, password_algo, \
         password_updated_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $6)",
        &[&id.as_uuid(), &tenant_id.as_uuid(), &email, &password_hash, &password_algo, &now],
    )?;
    Ok(User {
        id,
        tenant_id,
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        password_algo: password_algo.to_string(),
        password_updated_at: now,
        disabled: false,
        deleted_at: None,
        created_at: now,
    })
}

/// Finds a live user by email within the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn find_user_by_email(
    tx: &mut Transaction<'_>,
    email: &str,
) -> Result<Option<User>, PgStoreError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE lower(email) = lower($1) AND deleted_at IS NULL"
    );
    let row = tx.query_opt(sql.as_str(), &[&email])?;
    row.as_ref().map(user_from_row).transpose()
}

/// Loads a live user by id within the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_user(tx: &mut Transaction<'_>, user_id: UserId) -> Result<Option<User>, PgStoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
    let row = tx.query_opt(sql.as_str(), &[&user_id.as_uuid()])?;
    row.as_ref().map(user_from_row).transpose()
}

/// Rewrites a user's password hash.
///
/// # Errors
///
/// Returns [`PgStoreError::NotFound`] when the user does not exist.
pub fn set_password(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    password_hash: &str,
    password_algo: &str,
    now: OffsetDateTime,
) -> Result<(), PgStoreError> {
    let updated = tx.execute(
        "UPDATE users SET password_hash = $2, password_algo = $3, password_updated_at = $4 \
         WHERE id = $1 AND deleted_at IS NULL",
        &[&user_id.as_uuid(), &password_hash, &password_algo, &now],
    )?;
    if updated == 0 {
        return Err(PgStoreError::NotFound);
    }
    Ok(())
}

// ============================================================================
// SECTION: Roles and Grants
// ============================================================================

/// Creates a role for the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError::Conflict`] for duplicate names.
pub fn create_role(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    name: &str,
    system: bool,
) -> Result<Role, PgStoreError> {
    let id = RoleId::generate();
    tx.execute(
        "INSERT INTO roles (id, tenant_id, name, system) VALUES ($1, $2, $3, $4)",
        &[&id.as_uuid(), &tenant_id.as_uuid(), &name, &system],
    )?;
    Ok(Role {
        id,
        tenant_id,
        name: name.to_string(),
        system,
    })
}

/// Replaces a role's permission list.
///
/// # Errors
///
/// Returns [`PgStoreError`] when a statement fails; unknown permission names
/// violate the foreign key and surface as conflicts.
pub fn set_role_permissions(
    tx: &mut Transaction<'_>,
    role_id: RoleId,
    permissions: &[&str],
) -> Result<(), PgStoreError> {
    tx.execute("DELETE FROM role_permissions WHERE role_id = $1", &[&role_id.as_uuid()])?;
    for permission in permissions {
        tx.execute(
            "INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
            &[&role_id.as_uuid(), permission],
        )?;
    }
    Ok(())
}

/// Sentinel site id recorded for tenant-wide grants.
const TENANT_SCOPE_SENTINEL: Uuid = Uuid::nil();

/// Assigns a role to a user at a scope. Idempotent by composite key.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn assign_role(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    user_id: UserId,
    role_id: RoleId,
    scope: &GrantScope,
) -> Result<(), PgStoreError> {
    let (scope_type, site_id) = match scope {
        GrantScope::Tenant => ("tenant", TENANT_SCOPE_SENTINEL),
        GrantScope::Site { site_id } => ("site", site_id.as_uuid()),
    };
    tx.execute(
        "INSERT INTO role_grants (tenant_id, user_id, role_id, scope_type, site_id) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
        &[&tenant_id.as_uuid(), &user_id.as_uuid(), &role_id.as_uuid(), &scope_type, &site_id],
    )?;
    Ok(())
}

/// Resolves the merged grant set for a user within the bound tenant.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn load_grants(tx: &mut Transaction<'_>, user_id: UserId) -> Result<GrantSet, PgStoreError> {
    let rows = tx.query(
        "SELECT rp.permission, rg.scope_type, rg.site_id \
         FROM role_grants rg \
         JOIN role_permissions rp ON rp.role_id = rg.role_id \
         WHERE rg.user_id = $1",
        &[&user_id.as_uuid()],
    )?;
    let mut grants = GrantSet::new();
    for row in &rows {
        let permission: String = row.try_get("permission")?;
        let scope_type: String = row.try_get("scope_type")?;
        let site_id: Uuid = row.try_get("site_id")?;
        let grant = if scope_type == "tenant" {
            Grant {
                tenant_wide: true,
                site_ids: Default::default(),
            }
        } else {
            Grant {
                tenant_wide: false,
                site_ids: [SiteId::new(site_id)].into_iter().collect(),
            }
        };
        grants.add(permission, grant);
    }
    Ok(grants)
}
