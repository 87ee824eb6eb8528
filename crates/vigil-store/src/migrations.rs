// crates/vigil-store/src/migrations.rs
// ============================================================================
// Module: Embedded Migrations
// Description: Versioned schema DDL, RLS policies, and catalog seeds.
// Purpose: Bring a database to the current schema idempotently at startup.
// Dependencies: none (SQL literals only)
// ============================================================================

//! ## Overview
//! Migrations are embedded SQL batches applied in order and recorded in
//! `schema_migrations`. Every tenant-scoped table enables and forces row
//! level security with a policy comparing `tenant_id` to the
//! `app.tenant_id` session variable, so cross-tenant reads are structurally
//! impossible even for the table owner.
//!
//! ## Invariants
//! - The session variable name is `app.tenant_id`, uniformly.
//! - Partial unique indexes apply only to non-deleted rows.
//! - The permission catalog seed matches `vigil_core::PERMISSION_CATALOG`.

/// One migration: a version number and its SQL batch.
pub struct Migration {
    /// Monotonic version recorded in `schema_migrations`.
    pub version: i32,
    /// SQL batch executed inside one transaction.
    pub sql: &'static str,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        sql: SCHEMA_V2,
    },
];

/// Initial schema: tables, RLS policies, and seeds.
const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS tenants (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS permissions (
    name TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS sites (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, name)
);
ALTER TABLE sites ENABLE ROW LEVEL SECURITY;
ALTER TABLE sites FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON sites;
CREATE POLICY tenant_isolation ON sites
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    password_algo TEXT NOT NULL,
    password_updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    disabled BOOLEAN NOT NULL DEFAULT false,
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS users_email_live
    ON users (tenant_id, lower(email)) WHERE deleted_at IS NULL;
ALTER TABLE users ENABLE ROW LEVEL SECURITY;
ALTER TABLE users FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON users;
CREATE POLICY tenant_isolation ON users
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS roles (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    system BOOLEAN NOT NULL DEFAULT false,
    UNIQUE (tenant_id, name)
);
ALTER TABLE roles ENABLE ROW LEVEL SECURITY;
ALTER TABLE roles FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON roles;
CREATE POLICY tenant_isolation ON roles
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission TEXT NOT NULL REFERENCES permissions(name),
    PRIMARY KEY (role_id, permission)
);

CREATE TABLE IF NOT EXISTS role_grants (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    scope_type TEXT NOT NULL CHECK (scope_type IN ('tenant', 'site')),
    site_id UUID NOT NULL DEFAULT '00000000-0000-0000-0000-000000000000',
    PRIMARY KEY (user_id, role_id, scope_type, site_id)
);
ALTER TABLE role_grants ENABLE ROW LEVEL SECURITY;
ALTER TABLE role_grants FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON role_grants;
CREATE POLICY tenant_isolation ON role_grants
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS cameras (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id UUID NOT NULL REFERENCES sites(id),
    display_name TEXT NOT NULL,
    ip TEXT NOT NULL,
    port INT NOT NULL CHECK (port >= 1 AND port <= 65535),
    manufacturer TEXT,
    model TEXT,
    serial TEXT,
    mac TEXT,
    tags TEXT[] NOT NULL DEFAULT '{}',
    enabled BOOLEAN NOT NULL DEFAULT true,
    search_text TEXT NOT NULL DEFAULT '',
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS cameras_endpoint_live
    ON cameras (tenant_id, site_id, ip, port) WHERE deleted_at IS NULL;
ALTER TABLE cameras ENABLE ROW LEVEL SECURITY;
ALTER TABLE cameras FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON cameras;
CREATE POLICY tenant_isolation ON cameras
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS camera_groups (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id UUID REFERENCES sites(id),
    name TEXT NOT NULL,
    UNIQUE (tenant_id, name)
);
ALTER TABLE camera_groups ENABLE ROW LEVEL SECURITY;
ALTER TABLE camera_groups FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON camera_groups;
CREATE POLICY tenant_isolation ON camera_groups
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS group_members (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    group_id UUID NOT NULL REFERENCES camera_groups(id) ON DELETE CASCADE,
    camera_id UUID NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, camera_id)
);
ALTER TABLE group_members ENABLE ROW LEVEL SECURITY;
ALTER TABLE group_members FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON group_members;
CREATE POLICY tenant_isolation ON group_members
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS media_profiles (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    token TEXT NOT NULL,
    codec TEXT NOT NULL,
    resolution TEXT NOT NULL,
    fps INT NOT NULL,
    bitrate_kbps INT NOT NULL,
    rtsp_url TEXT NOT NULL,
    PRIMARY KEY (camera_id, token)
);
ALTER TABLE media_profiles ENABLE ROW LEVEL SECURITY;
ALTER TABLE media_profiles FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON media_profiles;
CREATE POLICY tenant_isolation ON media_profiles
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS stream_selections (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID PRIMARY KEY REFERENCES cameras(id) ON DELETE CASCADE,
    main_token TEXT NOT NULL,
    sub_token TEXT,
    supports_sub BOOLEAN NOT NULL,
    sub_equals_main BOOLEAN NOT NULL,
    version BIGINT NOT NULL DEFAULT 1
);
ALTER TABLE stream_selections ENABLE ROW LEVEL SECURITY;
ALTER TABLE stream_selections FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON stream_selections;
CREATE POLICY tenant_isolation ON stream_selections
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS credentials (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    owner_type TEXT NOT NULL CHECK (owner_type IN ('camera', 'nvr', 'onvif_bootstrap')),
    owner_id UUID NOT NULL,
    master_key_id TEXT NOT NULL,
    dek_nonce BYTEA NOT NULL,
    dek_ciphertext BYTEA NOT NULL,
    dek_tag BYTEA NOT NULL,
    payload_nonce BYTEA NOT NULL,
    payload_ciphertext BYTEA NOT NULL,
    payload_tag BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (owner_type, owner_id)
);
ALTER TABLE credentials ENABLE ROW LEVEL SECURITY;
ALTER TABLE credentials FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON credentials;
CREATE POLICY tenant_isolation ON credentials
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS nvrs (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id UUID NOT NULL REFERENCES sites(id),
    display_name TEXT NOT NULL,
    vendor TEXT NOT NULL CHECK (vendor IN ('hikvision', 'dahua', 'onvif')),
    ip TEXT NOT NULL,
    port INT NOT NULL CHECK (port >= 1 AND port <= 65535),
    status TEXT NOT NULL DEFAULT 'unknown',
    last_status_at TIMESTAMPTZ,
    enabled BOOLEAN NOT NULL DEFAULT true,
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS nvrs_endpoint_live
    ON nvrs (tenant_id, ip, port) WHERE deleted_at IS NULL;
ALTER TABLE nvrs ENABLE ROW LEVEL SECURITY;
ALTER TABLE nvrs FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON nvrs;
CREATE POLICY tenant_isolation ON nvrs
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS nvr_channels (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    nvr_id UUID NOT NULL REFERENCES nvrs(id) ON DELETE CASCADE,
    channel_ref TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    provisioning TEXT NOT NULL DEFAULT 'not_created'
        CHECK (provisioning IN ('not_created', 'created')),
    validation TEXT NOT NULL DEFAULT 'unknown'
        CHECK (validation IN ('unknown', 'ok', 'unauthorized', 'timeout', 'error')),
    camera_id UUID REFERENCES cameras(id),
    UNIQUE (nvr_id, channel_ref)
);
ALTER TABLE nvr_channels ENABLE ROW LEVEL SECURITY;
ALTER TABLE nvr_channels FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON nvr_channels;
CREATE POLICY tenant_isolation ON nvr_channels
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS camera_nvr_links (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID PRIMARY KEY REFERENCES cameras(id) ON DELETE CASCADE,
    nvr_id UUID NOT NULL REFERENCES nvrs(id) ON DELETE CASCADE,
    channel_ref TEXT NOT NULL,
    recording_mode TEXT NOT NULL CHECK (recording_mode IN ('vms', 'nvr'))
);
ALTER TABLE camera_nvr_links ENABLE ROW LEVEL SECURITY;
ALTER TABLE camera_nvr_links FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON camera_nvr_links;
CREATE POLICY tenant_isolation ON camera_nvr_links
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS discovery_runs (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    site_id UUID REFERENCES sites(id),
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running', 'completed', 'partially_completed', 'failed')),
    device_count INT NOT NULL DEFAULT 0,
    error_count INT NOT NULL DEFAULT 0,
    started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    finished_at TIMESTAMPTZ
);
ALTER TABLE discovery_runs ENABLE ROW LEVEL SECURITY;
ALTER TABLE discovery_runs FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON discovery_runs;
CREATE POLICY tenant_isolation ON discovery_runs
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS discovered_devices (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    run_id UUID NOT NULL REFERENCES discovery_runs(id) ON DELETE CASCADE,
    ip TEXT NOT NULL,
    xaddrs JSONB NOT NULL DEFAULT '[]',
    profile_s BOOLEAN NOT NULL DEFAULT false,
    profile_t BOOLEAN NOT NULL DEFAULT false,
    profile_g BOOLEAN NOT NULL DEFAULT false,
    capabilities JSONB NOT NULL DEFAULT '{}',
    media_profiles JSONB NOT NULL DEFAULT '[]',
    rtsp_uris JSONB NOT NULL DEFAULT '[]',
    last_error_code TEXT,
    UNIQUE (run_id, ip)
);
ALTER TABLE discovered_devices ENABLE ROW LEVEL SECURITY;
ALTER TABLE discovered_devices FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON discovered_devices;
CREATE POLICY tenant_isolation ON discovered_devices
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS camera_health (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID PRIMARY KEY REFERENCES cameras(id) ON DELETE CASCADE,
    status TEXT NOT NULL
        CHECK (status IN ('online', 'offline', 'auth_failed', 'stream_error')),
    last_checked_at TIMESTAMPTZ NOT NULL,
    last_success_at TIMESTAMPTZ,
    consecutive_failures INT NOT NULL DEFAULT 0,
    last_error_code TEXT
);
ALTER TABLE camera_health ENABLE ROW LEVEL SECURITY;
ALTER TABLE camera_health FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON camera_health;
CREATE POLICY tenant_isolation ON camera_health
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS camera_health_history (
    id BIGSERIAL PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    at TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    rtt_ms INT
);
CREATE INDEX IF NOT EXISTS camera_health_history_camera
    ON camera_health_history (camera_id, at DESC);
ALTER TABLE camera_health_history ENABLE ROW LEVEL SECURITY;
ALTER TABLE camera_health_history FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON camera_health_history;
CREATE POLICY tenant_isolation ON camera_health_history
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS alerts (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    camera_id UUID NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    opened_at TIMESTAMPTZ NOT NULL,
    closed_at TIMESTAMPTZ,
    last_notified_at TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS alerts_open_per_kind
    ON alerts (camera_id, kind) WHERE closed_at IS NULL;
ALTER TABLE alerts ENABLE ROW LEVEL SECURITY;
ALTER TABLE alerts FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON alerts;
CREATE POLICY tenant_isolation ON alerts
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS event_poll_state (
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    nvr_id UUID PRIMARY KEY REFERENCES nvrs(id) ON DELETE CASCADE,
    poll_cursor TEXT,
    since TIMESTAMPTZ,
    last_success_at TIMESTAMPTZ,
    consecutive_failures INT NOT NULL DEFAULT 0,
    last_error_code TEXT
);
ALTER TABLE event_poll_state ENABLE ROW LEVEL SECURITY;
ALTER TABLE event_poll_state FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON event_poll_state;
CREATE POLICY tenant_isolation ON event_poll_state
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

CREATE TABLE IF NOT EXISTS audit_events (
    id BIGSERIAL,
    event_id UUID NOT NULL UNIQUE,
    tenant_id UUID NOT NULL,
    actor_user_id UUID,
    action TEXT NOT NULL,
    target_type TEXT,
    target_id TEXT,
    result TEXT NOT NULL CHECK (result IN ('success', 'failure')),
    reason_code TEXT,
    request_id TEXT,
    client_ip TEXT,
    user_agent TEXT,
    metadata JSONB NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (id)
);
CREATE INDEX IF NOT EXISTS audit_events_tenant_time
    ON audit_events (tenant_id, created_at DESC, id DESC);
ALTER TABLE audit_events ENABLE ROW LEVEL SECURITY;
ALTER TABLE audit_events FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON audit_events;
CREATE POLICY tenant_isolation ON audit_events
    USING (tenant_id = current_setting('app.tenant_id', true)::uuid)
    WITH CHECK (tenant_id = current_setting('app.tenant_id', true)::uuid);

INSERT INTO permissions (name) VALUES
    ('camera.view'),
    ('camera.create'),
    ('camera.update'),
    ('camera.delete'),
    ('camera.control'),
    ('nvr.view'),
    ('nvr.manage'),
    ('discovery.run'),
    ('health.view'),
    ('live.view'),
    ('live.overlay'),
    ('audit.view'),
    ('audit.export'),
    ('license.view'),
    ('license.manage'),
    ('user.manage'),
    ('role.manage'),
    ('site.manage'),
    ('telemetry.write')
ON CONFLICT (name) DO NOTHING;
";

/// Trigram search support for camera lookup.
const SCHEMA_V2: &str = r"
CREATE EXTENSION IF NOT EXISTS pg_trgm;
CREATE INDEX IF NOT EXISTS cameras_search_trgm
    ON cameras USING gin (search_text gin_trgm_ops);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_nonempty() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            assert!(!migration.sql.trim().is_empty());
            last = migration.version;
        }
    }

    #[test]
    fn session_variable_name_is_uniform() {
        for migration in MIGRATIONS {
            assert!(!migration.sql.contains("app.current_tenant"));
        }
    }

    #[test]
    fn permission_seed_matches_catalog() {
        for permission in vigil_core::PERMISSION_CATALOG {
            assert!(
                MIGRATIONS[0].sql.contains(&format!("('{permission}')")),
                "missing seed for {permission}"
            );
        }
    }

    #[test]
    fn every_tenant_scoped_table_forces_rls() {
        let sql = MIGRATIONS[0].sql;
        let enabled = sql.matches("ENABLE ROW LEVEL SECURITY").count();
        let forced = sql.matches("FORCE ROW LEVEL SECURITY").count();
        let policies = sql.matches("CREATE POLICY tenant_isolation").count();
        assert_eq!(enabled, forced);
        assert_eq!(enabled, policies);
        assert!(policies >= 16);
    }
}
