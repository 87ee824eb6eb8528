// crates/vigil-server/tests/audit_spool.rs
// ============================================================================
// Module: Audit Spool Tests
// Description: Spool failover, idempotent replay, and the byte cap.
// Purpose: Pin the store-outage scenario end to end.
// Dependencies: vigil-server, vigil-core, tempfile
// ============================================================================

//! Audit disk-spool and replay tests with a scriptable store.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use time::OffsetDateTime;
use vigil_core::AuditEvent;
use vigil_core::AuditEventParams;
use vigil_core::AuditResult;
use vigil_core::DomainError;
use vigil_core::TenantId;
use vigil_server::audit::AuditService;
use vigil_server::audit::AuditStore;
use vigil_server::audit::SPOOL_FILE;
use vigil_server::metrics::ControlMetrics;
use vigil_server::metrics::Counter;
use vigil_server::metrics::CountingMetrics;

/// Store fake: scriptable availability, records written event ids.
#[derive(Default)]
struct ScriptedStore {
    /// When true every write fails.
    down: AtomicBool,
    /// Written events in arrival order.
    written: Mutex<Vec<AuditEvent>>,
}

impl ScriptedStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn written(&self) -> Vec<AuditEvent> {
        self.written.lock().unwrap().clone()
    }
}

impl AuditStore for ScriptedStore {
    fn write(&self, event: &AuditEvent) -> Result<bool, DomainError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DomainError::unavailable("db_down", "scripted outage"));
        }
        let mut written = self.written.lock().unwrap();
        if written.iter().any(|existing| existing.event_id == event.event_id) {
            return Ok(false);
        }
        written.push(event.clone());
        Ok(true)
    }
}

fn params(action: &str) -> AuditEventParams {
    AuditEventParams {
        tenant_id: TenantId::generate(),
        actor_user_id: None,
        action: action.to_string(),
        target_type: None,
        target_id: None,
        result: AuditResult::Success,
        reason_code: None,
        request_id: None,
        client_ip: None,
        user_agent: None,
        metadata: serde_json::json!({}),
    }
}

fn service(
    max_bytes: u64,
) -> (Arc<AuditService>, Arc<ScriptedStore>, Arc<CountingMetrics>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ScriptedStore::default());
    let metrics = Arc::new(CountingMetrics::new());
    let service = Arc::new(
        AuditService::new(
            Arc::clone(&store) as Arc<dyn AuditStore>,
            dir.path().to_path_buf(),
            max_bytes,
            Arc::clone(&metrics) as Arc<dyn ControlMetrics>,
        )
        .unwrap(),
    );
    (service, store, metrics, dir)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

#[test]
fn healthy_store_receives_writes_directly() {
    let (service, store, metrics, _dir) = service(1 << 20);
    service.write(params("camera.create"), now());
    assert_eq!(store.written().len(), 1);
    assert_eq!(metrics.get(Counter::AuditWritten), 1);
    assert_eq!(metrics.get(Counter::AuditSpooled), 0);
}

#[test]
fn outage_spools_then_replay_lands_all_events_exactly_once() {
    let (service, store, metrics, dir) = service(1 << 20);
    store.set_down(true);
    service.write(params("camera.create"), now());
    service.write(params("camera.delete"), now());
    service.write(params("nvr.create"), now());

    let spool_path = dir.path().join(SPOOL_FILE);
    let spooled = std::fs::read_to_string(&spool_path).unwrap();
    assert_eq!(spooled.lines().count(), 3);
    assert_eq!(metrics.get(Counter::AuditSpooled), 3);

    store.set_down(false);
    let landed = service.replay_once(now());
    assert_eq!(landed, 3);
    assert_eq!(store.written().len(), 3);
    assert!(!spool_path.exists(), "spool rotated away");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
    assert!(leftovers.is_empty(), "replay files removed after drain");

    // Every event id landed exactly once.
    let ids: BTreeSet<_> =
        store.written().iter().map(|event| event.event_id).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn replay_respools_when_store_still_down() {
    let (service, store, _, dir) = service(1 << 20);
    store.set_down(true);
    service.write(params("camera.create"), now());

    // Store still down: the cycle rotates, fails to land, re-spools.
    let landed = service.replay_once(now());
    assert_eq!(landed, 0);
    let spool_path = dir.path().join(SPOOL_FILE);
    let spooled = std::fs::read_to_string(&spool_path).unwrap();
    assert_eq!(spooled.lines().count(), 1);

    store.set_down(false);
    assert_eq!(service.replay_once(now()), 1);
    assert_eq!(store.written().len(), 1);
}

#[test]
fn replaying_the_same_event_twice_leaves_one_row() {
    let (service, store, _, dir) = service(1 << 20);
    store.set_down(true);
    service.write(params("camera.create"), now());
    let spool_path = dir.path().join(SPOOL_FILE);
    let line = std::fs::read_to_string(&spool_path).unwrap();
    // Simulate a crash that duplicated the spool line.
    std::fs::write(&spool_path, format!("{}{}", line, line)).unwrap();

    store.set_down(false);
    service.replay_once(now());
    assert_eq!(store.written().len(), 1, "event_id dedups the duplicate line");
}

#[test]
fn full_spool_drops_with_counter() {
    let (service, store, metrics, _dir) = service(64);
    store.set_down(true);
    // Each serialized event far exceeds 64 bytes.
    service.write(params("camera.create"), now());
    assert_eq!(metrics.get(Counter::AuditDropped), 1);
    assert_eq!(metrics.get(Counter::AuditSpooled), 0);
}

#[test]
fn write_never_fails_the_caller() {
    let (service, store, _, _dir) = service(64);
    store.set_down(true);
    // Even with the store down and the spool full, write returns.
    service.write(params("camera.create"), now());
    service.write(params("camera.create"), now());
}
