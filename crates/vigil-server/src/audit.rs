// crates/vigil-server/src/audit.rs
// ============================================================================
// Module: Audit Service
// Description: Audit writes with disk-spool failover and idempotent replay.
// Purpose: Never lose an audit event to a store outage.
// Dependencies: serde_json, vigil-core
// ============================================================================

//! ## Overview
//! `write` inserts through the store seam; on failure the event lands as one
//! JSON line in the spool file under the configured directory. The replayer
//! wakes periodically, atomically renames the spool to a `replay_<ms>.log`
//! file, and re-drives every line through the same write path, which either
//! lands (idempotent by `event_id`) or re-spools into a fresh spool file if
//! the store is still down. A single-flight lock keeps replay cycles from
//! overlapping, and leftover replay files from a crash are picked up on the
//! next cycle.
//!
//! ## Invariants
//! - Audit writes never fail the caller's operation.
//! - The spool directory never exceeds its aggregate byte cap; overflow
//!   drops the event and bumps a counter.
//! - Replaying a line twice leaves exactly one row (store idempotency).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use time::OffsetDateTime;

use vigil_core::AuditEvent;
use vigil_core::AuditEventParams;
use vigil_core::DomainError;

use crate::metrics::ControlMetrics;
use crate::metrics::Counter;
use crate::workers::Shutdown;
use crate::workers::spawn_worker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current spool file name.
pub const SPOOL_FILE: &str = "audit_spool.jsonl";

/// Replay wake interval.
pub const REPLAY_INTERVAL: Duration = Duration::from_secs(30);

/// Prefix of rotated replay files.
const REPLAY_PREFIX: &str = "replay_";

// ============================================================================
// SECTION: Store Seam
// ============================================================================

/// The durable audit write seam.
pub trait AuditStore: Send + Sync {
    /// Inserts an event idempotently; returns whether a row was written.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn write(&self, event: &AuditEvent) -> Result<bool, DomainError>;
}

impl AuditStore for vigil_store::PostgresStore {
    fn write(&self, event: &AuditEvent) -> Result<bool, DomainError> {
        self.with_tenant(event.tenant_id, |tx| vigil_store::audit::write_event(tx, event))
            .map_err(DomainError::from)
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Audit service with spool failover.
pub struct AuditService {
    /// Durable write seam.
    store: Arc<dyn AuditStore>,
    /// Spool directory.
    spool_dir: PathBuf,
    /// Aggregate byte cap across spool and replay files.
    spool_max_bytes: u64,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
    /// Single-flight guard for replay cycles.
    replay_lock: Mutex<()>,
}

impl AuditService {
    /// Builds the service, creating the spool directory when absent.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the spool directory cannot be created.
    pub fn new(
        store: Arc<dyn AuditStore>,
        spool_dir: PathBuf,
        spool_max_bytes: u64,
        metrics: Arc<dyn ControlMetrics>,
    ) -> Result<Self, DomainError> {
        fs::create_dir_all(&spool_dir)
            .map_err(|err| DomainError::internal(format!("spool dir: {err}")))?;
        Ok(Self {
            store,
            spool_dir,
            spool_max_bytes,
            metrics,
            replay_lock: Mutex::new(()),
        })
    }

    /// Records an audit event. Never fails the caller: store failures divert
    /// to the spool, and spool overflow drops with a counter.
    pub fn write(&self, params: AuditEventParams, now: OffsetDateTime) {
        let event = AuditEvent::new(params, now);
        self.write_existing(&event);
    }

    /// Drives an already-constructed event through store-then-spool.
    fn write_existing(&self, event: &AuditEvent) {
        match self.store.write(event) {
            Ok(_) => self.metrics.incr(Counter::AuditWritten),
            Err(err) => {
                tracing::warn!(error = %err, "audit store write failed; spooling");
                self.spool(event);
            }
        }
    }

    /// Appends one event line to the spool, honoring the byte cap.
    fn spool(&self, event: &AuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            self.metrics.incr(Counter::AuditDropped);
            return;
        };
        let projected = self.spool_bytes() + line.len() as u64 + 1;
        if projected > self.spool_max_bytes {
            self.metrics.incr(Counter::AuditDropped);
            return;
        }
        let path = self.spool_dir.join(SPOOL_FILE);
        let appended = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{line}"));
        match appended {
            Ok(()) => self.metrics.incr(Counter::AuditSpooled),
            Err(err) => {
                tracing::error!(error = %err, "audit spool append failed; event dropped");
                self.metrics.incr(Counter::AuditDropped);
            }
        }
    }

    /// Total bytes currently held in spool and replay files.
    fn spool_bytes(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.spool_dir) else {
            return 0;
        };
        entries
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name == SPOOL_FILE || name.starts_with(REPLAY_PREFIX)
            })
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Runs one replay cycle. Returns the number of events landed in the
    /// store. A cycle already in flight makes this a no-op.
    pub fn replay_once(&self, now: OffsetDateTime) -> usize {
        let Ok(_guard) = self.replay_lock.try_lock() else {
            return 0;
        };
        // Rotate the current spool so concurrent writers start a fresh file.
        let spool_path = self.spool_dir.join(SPOOL_FILE);
        if spool_path.exists() {
            let rotated = self
                .spool_dir
                .join(format!("{REPLAY_PREFIX}{}.log", now.unix_timestamp() * 1_000));
            if let Err(err) = fs::rename(&spool_path, &rotated) {
                tracing::error!(error = %err, "audit spool rotate failed");
                return 0;
            }
        }
        let mut landed = 0;
        for path in self.replay_files() {
            landed += self.replay_file(&path);
        }
        landed
    }

    /// Lists pending replay files, oldest first.
    fn replay_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.spool_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().starts_with(REPLAY_PREFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    /// Replays one rotated file line by line, then removes it.
    fn replay_file(&self, path: &Path) -> usize {
        let Ok(content) = fs::read_to_string(path) else {
            return 0;
        };
        let mut landed = 0;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) => match self.store.write(&event) {
                    Ok(_) => {
                        landed += 1;
                        self.metrics.incr(Counter::AuditReplayed);
                    }
                    // Store still down: push the event into the fresh spool.
                    Err(_) => self.spool(&event),
                },
                Err(err) => {
                    tracing::error!(error = %err, "unparseable audit spool line dropped");
                    self.metrics.incr(Counter::AuditDropped);
                }
            }
        }
        if let Err(err) = fs::remove_file(path) {
            tracing::error!(error = %err, "replay file cleanup failed");
        }
        landed
    }
}

// ============================================================================
// SECTION: Replayer Worker
// ============================================================================

/// Spawns the background replayer.
pub fn spawn_replayer(
    service: Arc<AuditService>,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    spawn_worker("audit-replayer", REPLAY_INTERVAL, shutdown, move || {
        let service = Arc::clone(&service);
        async move {
            let landed = tokio::task::spawn_blocking(move || {
                service.replay_once(OffsetDateTime::now_utc())
            })
            .await
            .unwrap_or(0);
            if landed > 0 {
                tracing::info!(landed, "audit replay cycle landed events");
            }
        }
    })
}
