// crates/vigil-config/src/config.rs
// ============================================================================
// Module: Process Configuration
// Description: Environment-derived configuration for the control plane.
// Purpose: Read the recognized VIGIL_* variables into typed, validated
//          structures.
// Dependencies: serde, url
// ============================================================================

//! ## Overview
//! Configuration comes exclusively from environment variables; there is no
//! YAML surface. Every recognized variable has either a safe default or is
//! required, and [`AppConfig::validate`] rejects inconsistent combinations
//! before the process wires any backend.
//!
//! ## Invariants
//! - Secrets (JWT key, DB password, master keys) are never Debug-printed.
//! - `validate` passes if and only if the process can plausibly start.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation failures.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required variable: {0}")]
    Missing(&'static str),
    /// A variable failed to parse into its typed form.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure detail.
        message: String,
    },
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Relational store connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Database name.
    pub name: String,
    /// libpq-style sslmode string.
    pub sslmode: String,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The password never reaches logs through Debug formatting.
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("name", &self.name)
            .field("sslmode", &self.sslmode)
            .finish_non_exhaustive()
    }
}

impl DbConfig {
    /// Renders a postgres connection string.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.password, self.name, self.sslmode
        )
    }
}

/// License file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Path to the license file; absent means the `missing` state.
    pub path: Option<PathBuf>,
    /// PEM public key used to verify license signatures.
    pub public_key_pem: Option<String>,
}

/// Audit disk-spool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Directory holding the spool and replay files.
    pub dir: PathBuf,
    /// Aggregate byte cap across spool files.
    pub max_bytes: u64,
}

/// Worker concurrency caps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerCaps {
    /// Maximum NVRs polled concurrently.
    pub poller_max_inflight: usize,
    /// Maximum health probes in flight.
    pub health_max_inflight: usize,
}

/// Complete process configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relational store settings.
    pub db: DbConfig,
    /// Hot-store (Redis) URL.
    pub redis_url: String,
    /// Event bus (NATS) URL.
    pub nats_url: String,
    /// Media-plane RPC base URL.
    pub media_url: String,
    /// SFU signaling URL handed to live-view clients.
    pub sfu_url: String,
    /// HLS base URL handed to live-view clients.
    pub hls_base_url: String,
    /// HS256 JWT signing secret.
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Master key list in `<id>:<base64>` comma form.
    #[serde(skip_serializing)]
    pub master_keys: String,
    /// Active master key id.
    pub active_master_key: String,
    /// Optional bootstrap key id reserved for ONVIF discovery credentials.
    pub onvif_bootstrap_key: Option<String>,
    /// Bearer token accepted on internal service endpoints.
    #[serde(skip_serializing)]
    pub service_token: Option<String>,
    /// License file settings.
    pub license: LicenseConfig,
    /// Audit spool settings.
    pub spool: SpoolConfig,
    /// Worker concurrency caps.
    pub workers: WorkerCaps,
    /// HTTP listen port.
    pub listen_port: u16,
    /// Dev-mode relaxations (missing-license camera quota).
    pub dev_mode: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach logs through Debug formatting.
        f.debug_struct("AppConfig")
            .field("db_host", &self.db.host)
            .field("db_name", &self.db.name)
            .field("redis_url", &self.redis_url)
            .field("nats_url", &self.nats_url)
            .field("active_master_key", &self.active_master_key)
            .field("license_path", &self.license.path)
            .field("spool_dir", &self.spool.dir)
            .field("listen_port", &self.listen_port)
            .field("dev_mode", &self.dev_mode)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Variable lookup seam so tests can avoid process-global environment state.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or malformed variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    /// Loads configuration from an explicit lookup table (tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or malformed variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| vars.get(name).cloned())
    }

    /// Loads configuration through a lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or malformed variables.
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let config = Self {
            db: DbConfig {
                host: optional(lookup, "VIGIL_DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parsed(lookup, "VIGIL_DB_PORT", 5432)?,
                user: optional(lookup, "VIGIL_DB_USER").unwrap_or_else(|| "vigil".to_string()),
                password: required(lookup, "VIGIL_DB_PASSWORD")?,
                name: optional(lookup, "VIGIL_DB_NAME").unwrap_or_else(|| "vigil".to_string()),
                sslmode: optional(lookup, "VIGIL_DB_SSLMODE")
                    .unwrap_or_else(|| "prefer".to_string()),
            },
            redis_url: optional(lookup, "VIGIL_REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            nats_url: optional(lookup, "VIGIL_NATS_URL")
                .unwrap_or_else(|| "nats://127.0.0.1:4222".to_string()),
            media_url: optional(lookup, "VIGIL_MEDIA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8550".to_string()),
            sfu_url: optional(lookup, "VIGIL_SFU_URL")
                .unwrap_or_else(|| "wss://127.0.0.1:8551/ws".to_string()),
            hls_base_url: optional(lookup, "VIGIL_HLS_BASE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8552/hls".to_string()),
            jwt_secret: required(lookup, "VIGIL_JWT_SECRET")?,
            master_keys: required(lookup, "VIGIL_MASTER_KEYS")?,
            active_master_key: required(lookup, "VIGIL_ACTIVE_MASTER_KEY")?,
            onvif_bootstrap_key: optional(lookup, "VIGIL_ONVIF_BOOTSTRAP_KEY"),
            service_token: optional(lookup, "VIGIL_SERVICE_TOKEN"),
            license: LicenseConfig {
                path: optional(lookup, "VIGIL_LICENSE_PATH").map(PathBuf::from),
                public_key_pem: optional(lookup, "VIGIL_LICENSE_PUBKEY_PEM"),
            },
            spool: SpoolConfig {
                dir: optional(lookup, "VIGIL_SPOOL_DIR")
                    .map_or_else(|| PathBuf::from("/var/lib/vigil/spool"), PathBuf::from),
                max_bytes: parsed(lookup, "VIGIL_SPOOL_MAX_BYTES", 64 * 1024 * 1024)?,
            },
            workers: WorkerCaps {
                poller_max_inflight: parsed(lookup, "VIGIL_POLLER_MAX_INFLIGHT", 8)?,
                health_max_inflight: parsed(lookup, "VIGIL_HEALTH_MAX_INFLIGHT", 16)?,
            },
            listen_port: parsed(lookup, "VIGIL_LISTEN_PORT", 8080)?,
            dev_mode: flag(lookup, "VIGIL_DEV_MODE"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for inconsistent combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "VIGIL_JWT_SECRET",
                message: "must be at least 32 bytes".to_string(),
            });
        }
        Url::parse(&self.redis_url).map_err(|err| ConfigError::Invalid {
            name: "VIGIL_REDIS_URL",
            message: err.to_string(),
        })?;
        Url::parse(&self.nats_url).map_err(|err| ConfigError::Invalid {
            name: "VIGIL_NATS_URL",
            message: err.to_string(),
        })?;
        if self.license.path.is_some() && self.license.public_key_pem.is_none() {
            return Err(ConfigError::Invalid {
                name: "VIGIL_LICENSE_PUBKEY_PEM",
                message: "required when VIGIL_LICENSE_PATH is set".to_string(),
            });
        }
        if self.spool.max_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "VIGIL_SPOOL_MAX_BYTES",
                message: "must be positive".to_string(),
            });
        }
        if self.workers.poller_max_inflight == 0 || self.workers.health_max_inflight == 0 {
            return Err(ConfigError::Invalid {
                name: "VIGIL_POLLER_MAX_INFLIGHT",
                message: "concurrency caps must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Lookup Helpers
// ============================================================================

/// Reads a required variable.
fn required(lookup: EnvLookup<'_>, name: &'static str) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Reads an optional variable, treating empty strings as absent.
fn optional(lookup: EnvLookup<'_>, name: &str) -> Option<String> {
    lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Reads a parseable variable with a default.
fn parsed<T: std::str::FromStr>(
    lookup: EnvLookup<'_>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            message: format!("could not parse {raw:?}"),
        }),
    }
}

/// Reads a boolean flag; `1`, `true`, and `yes` enable it.
fn flag(lookup: EnvLookup<'_>, name: &str) -> bool {
    optional(lookup, name)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
