// crates/vigil-server/src/license.rs
// ============================================================================
// Module: License Manager
// Description: Licensed-state singleton with hot reload and expiry alerts.
// Purpose: Gate capacity-changing operations behind the verified license.
// Dependencies: notify, vigil-core, vigil-crypto
// ============================================================================

//! ## Overview
//! The manager holds one [`LicenseSnapshot`] behind a read-write lock.
//! Reads are cheap clones under the read lock; reloads re-verify the file
//! and swap atomically under the write lock. A filesystem watcher triggers
//! reloads immediately, with a 60-second poll as the fallback, and every
//! reload emits exactly one audit event. The alert scheduler dedups the
//! 30-day, 7-day, and daily-grace expiry alerts through the tracker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::mpsc;
use std::time::Duration;

use notify::Watcher;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::AuditEventParams;
use vigil_core::AuditResult;
use vigil_core::DomainError;
use vigil_core::LicenseAlertTracker;
use vigil_core::LicenseParseFault;
use vigil_core::LicenseSnapshot;
use vigil_core::LicenseState;
use vigil_core::LicensedOperation;
use vigil_core::TenantId;
use vigil_core::UsageProvider;
use vigil_core::evaluate_state;
use vigil_crypto::LicenseFileError;
use vigil_crypto::parse_and_verify;

use crate::audit::AuditService;
use crate::metrics::ControlMetrics;
use crate::metrics::Counter;
use crate::workers::Shutdown;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll fallback interval for license reloads.
pub const LICENSE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Tenant recorded on system-initiated audit events.
#[must_use]
pub fn system_tenant() -> TenantId {
    TenantId::new(Uuid::nil())
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Guarded manager state.
struct ManagerState {
    /// Current snapshot.
    snapshot: LicenseSnapshot,
    /// Expiry alert dedup state.
    tracker: LicenseAlertTracker,
    /// License id the tracker belongs to.
    tracked_license: Option<String>,
}

/// The process-wide license manager.
pub struct LicenseManager {
    /// Snapshot and alert state behind the writer lock.
    inner: RwLock<ManagerState>,
    /// License file path; absent means the `missing` state.
    path: Option<PathBuf>,
    /// Verification public key (PEM).
    public_key_pem: Option<String>,
    /// Capacity usage source.
    usage: Arc<dyn UsageProvider>,
    /// Audit pipeline for reload and alert events.
    audit: Arc<AuditService>,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
    /// Dev-mode relaxation for the missing state.
    dev_mode: bool,
}

impl LicenseManager {
    /// Builds the manager and performs the initial load.
    #[must_use]
    pub fn new(
        path: Option<PathBuf>,
        public_key_pem: Option<String>,
        usage: Arc<dyn UsageProvider>,
        audit: Arc<AuditService>,
        metrics: Arc<dyn ControlMetrics>,
        dev_mode: bool,
        now: OffsetDateTime,
    ) -> Self {
        let manager = Self {
            inner: RwLock::new(ManagerState {
                snapshot: LicenseSnapshot::without_payload(LicenseState::Missing, now),
                tracker: LicenseAlertTracker::new(),
                tracked_license: None,
            }),
            path,
            public_key_pem,
            usage,
            audit,
            metrics,
            dev_mode,
        };
        manager.reload(now);
        manager
    }

    /// Reads and verifies the license file into a snapshot.
    fn load_snapshot(&self, now: OffsetDateTime) -> LicenseSnapshot {
        let Some(path) = &self.path else {
            return LicenseSnapshot::without_payload(LicenseState::Missing, now);
        };
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return LicenseSnapshot::without_payload(LicenseState::Missing, now),
        };
        let Some(public_key_pem) = &self.public_key_pem else {
            return LicenseSnapshot::without_payload(
                LicenseState::ParseError {
                    fault: LicenseParseFault::MalformedEnvelope,
                },
                now,
            );
        };
        match parse_and_verify(&bytes, public_key_pem) {
            Ok(payload) => {
                let state = evaluate_state(&payload, now);
                LicenseSnapshot {
                    state,
                    payload: Some(payload),
                    evaluated_at: now,
                }
            }
            Err(LicenseFileError::BadSignature) => {
                LicenseSnapshot::without_payload(LicenseState::InvalidSignature, now)
            }
            Err(LicenseFileError::FileTooLarge) => LicenseSnapshot::without_payload(
                LicenseState::ParseError {
                    fault: LicenseParseFault::FileTooLarge,
                },
                now,
            ),
            Err(_) => LicenseSnapshot::without_payload(
                LicenseState::ParseError {
                    fault: LicenseParseFault::MalformedEnvelope,
                },
                now,
            ),
        }
    }

    /// Atomically reloads the license and emits one audit event.
    ///
    /// Returns the resulting state.
    pub fn reload(&self, now: OffsetDateTime) -> LicenseState {
        let snapshot = self.load_snapshot(now);
        let state = snapshot.state;
        let license_id = snapshot.payload.as_ref().map(|payload| payload.license_id.clone());
        if let Ok(mut inner) = self.inner.write() {
            if inner.tracked_license != license_id {
                inner.tracker.reset();
                inner.tracked_license = license_id.clone();
            }
            inner.snapshot = snapshot;
        }
        self.metrics.incr(Counter::LicenseReloads);
        let result = match state {
            LicenseState::Valid { .. }
            | LicenseState::ExpiredGrace { .. }
            | LicenseState::Missing => AuditResult::Success,
            _ => AuditResult::Failure,
        };
        self.audit.write(
            AuditEventParams {
                tenant_id: system_tenant(),
                actor_user_id: None,
                action: "license.reload".to_string(),
                target_type: Some("license".to_string()),
                target_id: license_id,
                result,
                reason_code: Some(state.as_str().to_string()),
                request_id: None,
                client_ip: None,
                user_agent: None,
                metadata: serde_json::json!({}),
            },
            now,
        );
        state
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn status(&self) -> LicenseSnapshot {
        self.inner.read().map_or_else(
            |_| {
                LicenseSnapshot::without_payload(
                    LicenseState::Missing,
                    OffsetDateTime::UNIX_EPOCH,
                )
            },
            |inner| inner.snapshot.clone(),
        )
    }

    /// Checks whether the current state allows an operation for a tenant.
    ///
    /// # Errors
    ///
    /// Returns a license-blocked failure with its stable reason code.
    pub fn check(&self, operation_label: &str, tenant_id: TenantId) -> Result<(), DomainError> {
        let operation = LicensedOperation::parse(operation_label);
        let snapshot = self.status();
        vigil_core::check_operation(
            operation,
            tenant_id,
            &snapshot,
            self.usage.as_ref(),
            self.dev_mode,
        )
    }

    /// Runs one alert-scheduler tick, emitting at most one deduped alert.
    pub fn alert_tick(&self, now: OffsetDateTime) {
        let due = {
            let Ok(mut inner) = self.inner.write() else {
                return;
            };
            let state = inner.snapshot.state;
            inner.tracker.due_alert(state, now)
        };
        if let Some(alert) = due {
            self.audit.write(
                AuditEventParams {
                    tenant_id: system_tenant(),
                    actor_user_id: None,
                    action: "license.alert".to_string(),
                    target_type: Some("license".to_string()),
                    target_id: None,
                    result: AuditResult::Success,
                    reason_code: Some(alert.as_str().to_string()),
                    request_id: None,
                    client_ip: None,
                    user_agent: None,
                    metadata: serde_json::json!({}),
                },
                now,
            );
        }
    }
}

// ============================================================================
// SECTION: Watcher Worker
// ============================================================================

/// Spawns the license watcher: filesystem events plus the poll fallback.
///
/// Runs on a dedicated thread because the notify watcher and the blocking
/// receive loop are synchronous.
pub fn spawn_license_watcher(
    manager: Arc<LicenseManager>,
    shutdown: Shutdown,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let (tx, rx) = mpsc::channel::<()>();
        // The watcher handle must stay alive for events to flow; watch
        // errors degrade to poll-only reloads.
        let _watcher = manager.path.as_ref().and_then(|path| {
            let tx = tx.clone();
            let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                if result.is_ok() {
                    let _ = tx.send(());
                }
            })
            .ok()?;
            watcher.watch(path, notify::RecursiveMode::NonRecursive).ok()?;
            Some(watcher)
        });
        loop {
            if shutdown.is_triggered() {
                break;
            }
            // Either a filesystem event or the poll fallback wakes us.
            let _ = rx.recv_timeout(LICENSE_POLL_INTERVAL);
            if shutdown.is_triggered() {
                break;
            }
            let now = OffsetDateTime::now_utc();
            manager.reload(now);
            manager.alert_tick(now);
        }
    })
}
