// crates/vigil-server/src/telemetry.rs
// ============================================================================
// Module: Telemetry Ingest
// Description: Bounded-rate viewer event ingestion and counter fan-out.
// Purpose: Keep session liveness honest without letting clients flood the
//          control plane.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! Clients post viewer events against their session. Ingest validates the
//! event and reason codes against their closed sets, requires the session
//! to still exist, and enforces the per-session fixed-window rate limit.
//! Positive signals extend the session TTL; `session_end` removes the
//! session from the active set immediately instead of waiting for expiry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::RateWindow;
use vigil_core::SessionStore;
use vigil_core::TELEMETRY_RATE_LIMIT;
use vigil_core::TELEMETRY_RATE_WINDOW_SECS;
use vigil_core::TelemetryEvent;
use vigil_core::TelemetryEventType;

use crate::auth::AuthContext;
use crate::metrics::ControlMetrics;
use crate::metrics::Counter;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Telemetry ingest service.
pub struct TelemetryService {
    /// Session storage seam.
    sessions: Arc<dyn SessionStore>,
    /// Rate window seam.
    rate: Arc<dyn RateWindow>,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
}

impl TelemetryService {
    /// Builds the service.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        rate: Arc<dyn RateWindow>,
        metrics: Arc<dyn ControlMetrics>,
    ) -> Self {
        Self {
            sessions,
            rate,
            metrics,
        }
    }

    /// Records one viewer event.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for unknown sessions, a rate-limit
    /// failure past the window cap, and dependency failures from the hot
    /// store.
    pub fn record_event(
        &self,
        auth: &AuthContext,
        event: &TelemetryEvent,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        // The deserialized enums already constrain event_type and
        // reason_code to their closed sets; what remains is liveness,
        // ownership, and rate.
        let Some(mut session) =
            self.sessions.get_session(event.session_id, now).map_err(DomainError::from)?
        else {
            self.metrics.incr(Counter::TelemetryRejected);
            return Err(DomainError::validation("session_id", "session not found or expired"));
        };
        if session.tenant_id != auth.tenant_id || session.user_id != auth.user_id {
            self.metrics.incr(Counter::TelemetryRejected);
            // Indistinguishable from an expired session.
            return Err(DomainError::validation("session_id", "session not found or expired"));
        }

        let rate_scope = format!("telemetry:{}", event.session_id);
        let count = self
            .rate
            .increment(
                &rate_scope,
                TELEMETRY_RATE_WINDOW_SECS,
                now.unix_timestamp() * 1_000,
            )
            .map_err(DomainError::from)?;
        if count > TELEMETRY_RATE_LIMIT {
            self.metrics.incr(Counter::TelemetryRejected);
            return Err(DomainError::new(
                ErrorKind::RateLimited,
                "telemetry_rate_limited",
                "per-session event rate exceeded",
            ));
        }

        match event.event_type {
            TelemetryEventType::SessionEnd => {
                self.sessions.remove_session(&session).map_err(DomainError::from)?;
            }
            TelemetryEventType::FallbackToHls => {
                self.metrics.incr(Counter::FallbacksToHls);
                session.fallback_count = session.fallback_count.saturating_add(1);
                session.last_error = event.reason_code.map(|reason| reason.as_str().to_string());
                self.sessions.update_session(&session).map_err(DomainError::from)?;
            }
            TelemetryEventType::TileStart => self.metrics.incr(Counter::TileStarts),
            TelemetryEventType::TileStop => self.metrics.incr(Counter::TileStops),
            _ => {}
        }

        if event.event_type.is_positive_signal() {
            self.sessions.extend_session(event.session_id, now).map_err(DomainError::from)?;
        }
        self.metrics.incr(Counter::TelemetryAccepted);
        Ok(())
    }
}
