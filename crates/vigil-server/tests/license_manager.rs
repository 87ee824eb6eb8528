// crates/vigil-server/tests/license_manager.rs
// ============================================================================
// Module: License Manager Tests
// Description: Disk reload, gating, and reload auditing with real files.
// Purpose: Pin the manager against signed license files on disk.
// Dependencies: vigil-server, vigil-crypto, rsa, tempfile
// ============================================================================

//! License manager tests with generated RSA keys and temp files.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rsa::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use rsa::RsaPublicKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::pkcs8::LineEnding;
use sha2::Digest;
use sha2::Sha256;
use time::Duration;
use time::OffsetDateTime;
use vigil_core::AuditEvent;
use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::LicenseState;
use vigil_core::TenantId;
use vigil_core::interfaces::memory::StaticUsage;
use vigil_server::audit::AuditService;
use vigil_server::audit::AuditStore;
use vigil_server::license::LicenseManager;
use vigil_server::metrics::ControlMetrics;
use vigil_server::metrics::NoopMetrics;

/// Store fake recording every audit write.
#[derive(Default)]
struct RecordingStore {
    written: Mutex<Vec<AuditEvent>>,
}

impl AuditStore for RecordingStore {
    fn write(&self, event: &AuditEvent) -> Result<bool, DomainError> {
        self.written.lock().unwrap().push(event.clone());
        Ok(true)
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

fn write_license(
    dir: &tempfile::TempDir,
    private: &RsaPrivateKey,
    valid_until: OffsetDateTime,
    max_cameras: u32,
) -> PathBuf {
    let payload = serde_json::json!({
        "license_id": "lic-test",
        "customer_name": "Acme Surveillance",
        "tenant_scope": "acme",
        "issued_at_utc": "2020-01-01T00:00:00Z",
        "valid_until_utc": valid_until
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap(),
        "limits": { "max_cameras": max_cameras, "max_nvrs": 2 },
        "features": {}
    })
    .to_string();
    let digest = Sha256::digest(payload.as_bytes());
    let signature = private.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();
    let envelope = serde_json::json!({
        "payload_b64": BASE64.encode(payload.as_bytes()),
        "sig_b64": BASE64.encode(signature),
        "alg": "RS256",
    });
    let path = dir.path().join("license.json");
    std::fs::write(&path, envelope.to_string()).unwrap();
    path
}

struct Harness {
    manager: LicenseManager,
    store: Arc<RecordingStore>,
    _dir: tempfile::TempDir,
    private: RsaPrivateKey,
    path: PathBuf,
}

fn harness(valid_until: OffsetDateTime, max_cameras: u32, cameras_in_use: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let public_pem =
        RsaPublicKey::from(&private).to_public_key_pem(LineEnding::LF).unwrap();
    let path = write_license(&dir, &private, valid_until, max_cameras);

    let store = Arc::new(RecordingStore::default());
    let audit = Arc::new(
        AuditService::new(
            Arc::clone(&store) as Arc<dyn AuditStore>,
            dir.path().join("spool"),
            1 << 20,
            Arc::new(NoopMetrics) as Arc<dyn ControlMetrics>,
        )
        .unwrap(),
    );
    let manager = LicenseManager::new(
        Some(path.clone()),
        Some(public_pem),
        Arc::new(StaticUsage::new(cameras_in_use, 0)),
        audit,
        Arc::new(NoopMetrics),
        false,
        now(),
    );
    Harness {
        manager,
        store,
        _dir: dir,
        private,
        path,
    }
}

#[test]
fn valid_license_allows_creates_under_capacity() {
    let h = harness(now() + Duration::days(100), 10, 3);
    assert!(matches!(h.manager.status().state, LicenseState::Valid { .. }));
    h.manager.check("camera.create", TenantId::generate()).unwrap();
}

#[test]
fn capacity_exhaustion_denies_camera_create() {
    let h = harness(now() + Duration::days(100), 3, 3);
    let denied = h.manager.check("camera.create", TenantId::generate()).unwrap_err();
    assert_eq!(denied.kind, ErrorKind::LicenseBlocked);
    assert_eq!(denied.reason_code, "license_camera_limit");
}

#[test]
fn grace_license_denies_creates_but_allows_reads() {
    let h = harness(now() - Duration::hours(1), 10, 0);
    assert!(matches!(h.manager.status().state, LicenseState::ExpiredGrace { .. }));
    let denied = h.manager.check("camera.create", TenantId::generate()).unwrap_err();
    assert_eq!(denied.reason_code, "license_expired_grace");
    h.manager.check("camera.view", TenantId::generate()).unwrap();
}

#[test]
fn reload_emits_one_audit_event_with_state_reason() {
    let h = harness(now() + Duration::days(100), 10, 0);
    let before = h.store.written.lock().unwrap().len();
    h.manager.reload(now());
    let written = h.store.written.lock().unwrap();
    assert_eq!(written.len(), before + 1);
    let event = written.last().unwrap();
    assert_eq!(event.action, "license.reload");
    assert_eq!(event.reason_code.as_deref(), Some("valid"));
}

#[test]
fn hot_reload_picks_up_a_replacement_file() {
    let h = harness(now() - Duration::days(60), 10, 0);
    assert!(matches!(h.manager.status().state, LicenseState::ExpiredBlocked));

    // Operator drops a fresh license at the same path.
    let dir = tempfile::TempDir::new().unwrap();
    let fresh = write_license(&dir, &h.private, now() + Duration::days(365), 10);
    std::fs::copy(&fresh, &h.path).unwrap();

    let state = h.manager.reload(now());
    assert!(matches!(state, LicenseState::Valid { .. }));
    h.manager.check("camera.create", TenantId::generate()).unwrap();
}

#[test]
fn tampered_file_reports_invalid_signature_and_denies_all() {
    let h = harness(now() + Duration::days(100), 10, 0);
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&h.path).unwrap()).unwrap();
    let forged = serde_json::json!({
        "license_id": "lic-test",
        "customer_name": "Acme Surveillance",
        "tenant_scope": "acme",
        "issued_at_utc": "2020-01-01T00:00:00Z",
        "valid_until_utc": "2099-01-01T00:00:00Z",
        "limits": { "max_cameras": 100_000, "max_nvrs": 400 },
        "features": {}
    })
    .to_string();
    raw["payload_b64"] = serde_json::Value::String(BASE64.encode(forged.as_bytes()));
    std::fs::write(&h.path, raw.to_string()).unwrap();

    let state = h.manager.reload(now());
    assert_eq!(state, LicenseState::InvalidSignature);
    let denied = h.manager.check("camera.view", TenantId::generate()).unwrap_err();
    assert_eq!(denied.reason_code, "license_invalid_signature");
}

#[test]
fn missing_file_without_dev_mode_denies() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore::default());
    let audit = Arc::new(
        AuditService::new(
            Arc::clone(&store) as Arc<dyn AuditStore>,
            dir.path().join("spool"),
            1 << 20,
            Arc::new(NoopMetrics) as Arc<dyn ControlMetrics>,
        )
        .unwrap(),
    );
    let manager = LicenseManager::new(
        None,
        None,
        Arc::new(StaticUsage::new(0, 0)),
        audit,
        Arc::new(NoopMetrics),
        false,
        now(),
    );
    assert_eq!(manager.status().state, LicenseState::Missing);
    let denied = manager.check("camera.create", TenantId::generate()).unwrap_err();
    assert_eq!(denied.reason_code, "license_missing");
}
