// crates/vigil-store/src/store.rs
// ============================================================================
// Module: Postgres Store
// Description: Pooled Postgres access with tenant-bound transactions.
// Purpose: Provide durable multi-tenant storage with structural row-level
//          isolation.
// Dependencies: postgres, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! The store wraps an r2d2 pool of Postgres connections. Every tenant-scoped
//! operation runs inside [`PostgresStore::with_tenant`], which opens a
//! transaction and executes `SET LOCAL app.tenant_id` before the caller's
//! closure runs. `SET LOCAL` is transaction-scoped, so the variable is gone
//! by the time the connection returns to the pool. Global operations
//! (tenant bootstrap, migrations, audit replay) use
//! [`PostgresStore::with_global`].
//!
//! ## Invariants
//! - No tenant-scoped SQL executes outside a tenant-bound transaction.
//! - Unique violations surface as [`PgStoreError::Conflict`], never as
//!   generic failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use postgres::NoTls;
use postgres::Transaction;
use postgres::error::SqlState;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::TenantId;

use crate::migrations::MIGRATIONS;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Postgres store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStoreConfig {
    /// Postgres connection string.
    pub connection: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            connection: "host=localhost user=vigil dbname=vigil".to_string(),
            max_connections: 16,
            connect_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres store failures.
#[derive(Debug, Error)]
pub enum PgStoreError {
    /// The pool could not hand out a connection.
    #[error("postgres pool unavailable: {0}")]
    Pool(String),
    /// A statement failed.
    #[error("postgres error: {0}")]
    Postgres(String),
    /// A uniqueness or constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The requested row does not exist (or is invisible under RLS).
    #[error("row not found")]
    NotFound,
    /// A stored value failed to decode into its domain shape.
    #[error("stored data corrupt: {0}")]
    Corrupt(String),
}

impl PgStoreError {
    /// Maps the failure onto the closed error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Pool(_) | Self::Postgres(_) => ErrorKind::DependencyUnavailable,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound => ErrorKind::NotFound,
            Self::Corrupt(_) => ErrorKind::DataCorruption,
        }
    }
}

impl From<postgres::Error> for PgStoreError {
    fn from(err: postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            if db_err.code() == &SqlState::UNIQUE_VIOLATION {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::Postgres(err.to_string())
    }
}

impl From<PgStoreError> for DomainError {
    fn from(err: PgStoreError) -> Self {
        match err.kind() {
            ErrorKind::Conflict => Self::conflict("duplicate_resource", err.to_string()),
            ErrorKind::NotFound => Self::not_found("resource_missing"),
            ErrorKind::DataCorruption => {
                Self::new(ErrorKind::DataCorruption, "store_corrupt", err.to_string())
            }
            _ => Self::unavailable("store_unavailable", err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Pooled Postgres store.
pub struct PostgresStore {
    /// Connection pool.
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
    /// Connects the pool and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PgStoreError`] when connection or migration fails.
    pub fn connect(config: &PostgresStoreConfig) -> Result<Self, PgStoreError> {
        let mut pg_config = config
            .connection
            .parse::<postgres::Config>()
            .map_err(|err| PgStoreError::Postgres(err.to_string()))?;
        pg_config.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .map_err(|err| PgStoreError::Pool(err.to_string()))?;
        let store = Self {
            pool,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Applies pending migrations in order.
    ///
    /// # Errors
    ///
    /// Returns [`PgStoreError`] when a migration batch fails.
    pub fn migrate(&self) -> Result<(), PgStoreError> {
        let mut conn = self.pool.get().map_err(|err| PgStoreError::Pool(err.to_string()))?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )?;
        for migration in MIGRATIONS {
            let mut tx = conn.transaction()?;
            let applied = tx
                .query_opt(
                    "SELECT version FROM schema_migrations WHERE version = $1",
                    &[&migration.version],
                )?
                .is_some();
            if applied {
                tx.commit()?;
                continue;
            }
            tx.batch_execute(migration.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version) VALUES ($1)",
                &[&migration.version],
            )?;
            tx.commit()?;
        }
        Ok(())
    }

    /// Runs a closure inside a tenant-bound transaction.
    ///
    /// The transaction sets `app.tenant_id` with `SET LOCAL` semantics, so
    /// every RLS policy evaluates against this tenant and the variable
    /// clears when the transaction ends.
    ///
    /// # Errors
    ///
    /// Returns [`PgStoreError`] from the closure or transaction machinery.
    pub fn with_tenant<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, PgStoreError>,
    ) -> Result<T, PgStoreError> {
        let mut conn = self.pool.get().map_err(|err| PgStoreError::Pool(err.to_string()))?;
        let mut tx = conn.transaction()?;
        tx.execute(
            "SELECT set_config('app.tenant_id', $1, true)",
            &[&tenant_id.as_uuid().to_string()],
        )?;
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Runs a closure inside a transaction with no tenant binding.
    ///
    /// Only global tables (tenants, permissions, migrations) and the audit
    /// replay path use this; RLS-protected tables yield no rows here.
    ///
    /// # Errors
    ///
    /// Returns [`PgStoreError`] from the closure or transaction machinery.
    pub fn with_global<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, PgStoreError>,
    ) -> Result<T, PgStoreError> {
        let mut conn = self.pool.get().map_err(|err| PgStoreError::Pool(err.to_string()))?;
        let mut tx = conn.transaction()?;
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }
}
