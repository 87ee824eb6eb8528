// crates/vigil-config/tests/config_defaults.rs
// ============================================================================
// Module: Config Tests
// Description: Verify defaults, required variables, and validation rules.
// Purpose: Pin the recognized environment surface.
// Dependencies: vigil-config
// ============================================================================

//! Configuration loading and validation tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::collections::HashMap;

use vigil_config::AppConfig;
use vigil_config::ConfigError;

fn minimal_vars() -> HashMap<String, String> {
    [
        ("VIGIL_DB_PASSWORD", "dbpass"),
        ("VIGIL_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ("VIGIL_MASTER_KEYS", "k1:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
        ("VIGIL_ACTIVE_MASTER_KEY", "k1"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

#[test]
fn minimal_environment_loads_with_defaults() {
    let config = AppConfig::from_map(&minimal_vars()).unwrap();
    assert_eq!(config.db.host, "localhost");
    assert_eq!(config.db.port, 5432);
    assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
    assert_eq!(config.nats_url, "nats://127.0.0.1:4222");
    assert_eq!(config.listen_port, 8080);
    assert_eq!(config.workers.poller_max_inflight, 8);
    assert!(!config.dev_mode);
    assert!(config.license.path.is_none());
}

#[test]
fn missing_jwt_secret_is_reported_by_name() {
    let mut vars = minimal_vars();
    vars.remove("VIGIL_JWT_SECRET");
    let err = AppConfig::from_map(&vars).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("VIGIL_JWT_SECRET")));
}

#[test]
fn short_jwt_secret_fails_validation() {
    let mut vars = minimal_vars();
    vars.insert("VIGIL_JWT_SECRET".to_string(), "short".to_string());
    let err = AppConfig::from_map(&vars).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            name: "VIGIL_JWT_SECRET",
            ..
        }
    ));
}

#[test]
fn license_path_requires_public_key() {
    let mut vars = minimal_vars();
    vars.insert("VIGIL_LICENSE_PATH".to_string(), "/etc/vigil/license.json".to_string());
    let err = AppConfig::from_map(&vars).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            name: "VIGIL_LICENSE_PUBKEY_PEM",
            ..
        }
    ));
}

#[test]
fn malformed_port_is_rejected() {
    let mut vars = minimal_vars();
    vars.insert("VIGIL_LISTEN_PORT".to_string(), "eighty".to_string());
    let err = AppConfig::from_map(&vars).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            name: "VIGIL_LISTEN_PORT",
            ..
        }
    ));
}

#[test]
fn dev_mode_flag_accepts_truthy_values() {
    for value in ["1", "true", "YES"] {
        let mut vars = minimal_vars();
        vars.insert("VIGIL_DEV_MODE".to_string(), value.to_string());
        assert!(AppConfig::from_map(&vars).unwrap().dev_mode, "value {value:?}");
    }
    let mut vars = minimal_vars();
    vars.insert("VIGIL_DEV_MODE".to_string(), "off".to_string());
    assert!(!AppConfig::from_map(&vars).unwrap().dev_mode);
}

#[test]
fn debug_output_hides_secrets() {
    let config = AppConfig::from_map(&minimal_vars()).unwrap();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("dbpass"));
    assert!(!rendered.contains("0123456789abcdef"));
}
