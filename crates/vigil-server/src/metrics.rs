// crates/vigil-server/src/metrics.rs
// ============================================================================
// Module: Control-Plane Metrics
// Description: Counter sink with a closed, bounded label set.
// Purpose: Let deployments route counters to their pipeline without a hard
//          dependency on any metrics backend.
// Dependencies: none (std only)
// ============================================================================

//! ## Overview
//! Counters are a closed enum, so label cardinality is bounded by
//! construction. The default sink discards everything; tests use
//! [`CountingMetrics`] to assert on specific counters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

// ============================================================================
// SECTION: Counters
// ============================================================================

/// The closed counter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Counter {
    /// Audit events written to the store.
    AuditWritten,
    /// Audit events diverted to the disk spool.
    AuditSpooled,
    /// Audit events dropped because the spool was full.
    AuditDropped,
    /// Audit events replayed from the spool into the store.
    AuditReplayed,
    /// NVR events published to the bus.
    EventsPublished,
    /// NVR events suppressed by the dedup window.
    EventsDeduped,
    /// NVR poll cycles that failed.
    PollFailures,
    /// Live sessions issued.
    LiveSessionsIssued,
    /// Live session requests rejected at the cap.
    LiveLimitRejections,
    /// Telemetry events accepted.
    TelemetryAccepted,
    /// Telemetry events rejected (validation or rate limit).
    TelemetryRejected,
    /// Client fallbacks to HLS.
    FallbacksToHls,
    /// Grid tiles started.
    TileStarts,
    /// Grid tiles stopped.
    TileStops,
    /// License reloads performed.
    LicenseReloads,
    /// Health probes executed.
    HealthProbes,
    /// Health alerts opened.
    AlertsOpened,
}

impl Counter {
    /// Returns the stable counter name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuditWritten => "audit_written",
            Self::AuditSpooled => "audit_spooled",
            Self::AuditDropped => "audit_dropped",
            Self::AuditReplayed => "audit_replayed",
            Self::EventsPublished => "events_published",
            Self::EventsDeduped => "events_deduped",
            Self::PollFailures => "poll_failures",
            Self::LiveSessionsIssued => "live_sessions_issued",
            Self::LiveLimitRejections => "live_limit_rejections",
            Self::TelemetryAccepted => "telemetry_accepted",
            Self::TelemetryRejected => "telemetry_rejected",
            Self::FallbacksToHls => "fallbacks_to_hls",
            Self::TileStarts => "tile_starts",
            Self::TileStops => "tile_stops",
            Self::LicenseReloads => "license_reloads",
            Self::HealthProbes => "health_probes",
            Self::AlertsOpened => "alerts_opened",
        }
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Counter sink for observability.
pub trait ControlMetrics: Send + Sync {
    /// Increments a counter by one.
    fn incr(&self, counter: Counter);
}

/// Sink that discards every counter.
pub struct NoopMetrics;

impl ControlMetrics for NoopMetrics {
    fn incr(&self, _counter: Counter) {}
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    /// Counter totals.
    counts: Mutex<BTreeMap<Counter, u64>>,
}

impl CountingMetrics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a counter's total.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counts.lock().map(|counts| counts.get(&counter).copied().unwrap_or(0)).unwrap_or(0)
    }
}

impl ControlMetrics for CountingMetrics {
    fn incr(&self, counter: Counter) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(counter).or_insert(0) += 1;
        }
    }
}
