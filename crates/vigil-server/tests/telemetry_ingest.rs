// crates/vigil-server/tests/telemetry_ingest.rs
// ============================================================================
// Module: Telemetry Ingest Tests
// Description: Session liveness, rate limiting, and counter fan-out.
// Purpose: Pin the viewer-event contract at the service seam.
// Dependencies: vigil-server, vigil-core
// ============================================================================

//! Telemetry ingest tests against in-memory stores.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::sync::Arc;

use time::Duration;
use time::OffsetDateTime;
use vigil_core::CameraId;
use vigil_core::ErrorKind;
use vigil_core::InMemoryRateWindow;
use vigil_core::InMemorySessionStore;
use vigil_core::SESSION_TTL_SECS;
use vigil_core::SessionId;
use vigil_core::SessionStore;
use vigil_core::StreamQuality;
use vigil_core::TELEMETRY_RATE_LIMIT;
use vigil_core::TelemetryEvent;
use vigil_core::TelemetryEventType;
use vigil_core::TelemetryReasonCode;
use vigil_core::TenantId;
use vigil_core::UserId;
use vigil_core::ViewMode;
use vigil_core::ViewerSession;
use vigil_server::auth::AuthContext;
use vigil_server::metrics::Counter;
use vigil_server::metrics::CountingMetrics;
use vigil_server::telemetry::TelemetryService;

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

struct Harness {
    service: TelemetryService,
    sessions: Arc<InMemorySessionStore>,
    metrics: Arc<CountingMetrics>,
    auth: AuthContext,
    session: ViewerSession,
}

fn harness() -> Harness {
    let sessions = Arc::new(InMemorySessionStore::new());
    let metrics = Arc::new(CountingMetrics::new());
    let service = TelemetryService::new(
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::new(InMemoryRateWindow::new()) as Arc<dyn vigil_core::RateWindow>,
        Arc::clone(&metrics) as Arc<dyn vigil_server::metrics::ControlMetrics>,
    );
    let auth = AuthContext {
        tenant_id: TenantId::generate(),
        user_id: UserId::generate(),
        request_id: None,
        client_ip: None,
        user_agent: None,
    };
    let now = base_time();
    let session = ViewerSession {
        session_id: SessionId::generate(),
        tenant_id: auth.tenant_id,
        user_id: auth.user_id,
        camera_id: CameraId::generate(),
        mode: ViewMode::Grid,
        selected_quality: StreamQuality::Sub,
        created_at: now,
        last_seen_at: now,
        expires_at: now + Duration::seconds(SESSION_TTL_SECS as i64),
        fallback_count: 0,
        last_error: None,
        overlay: false,
    };
    sessions.create_session(&session).unwrap();
    Harness {
        service,
        sessions,
        metrics,
        auth,
        session,
    }
}

fn event(session_id: SessionId, event_type: TelemetryEventType) -> TelemetryEvent {
    TelemetryEvent {
        session_id,
        event_type,
        reason_code: None,
        ts_unix_ms: base_time().unix_timestamp() * 1_000,
    }
}

#[test]
fn accepts_heartbeat_and_extends_ttl() {
    let h = harness();
    let midway = base_time() + Duration::seconds(300);
    h.service
        .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::Heartbeat), midway)
        .unwrap();
    // The session now outlives its original expiry.
    let past_original = base_time() + Duration::seconds(SESSION_TTL_SECS as i64 + 10);
    assert!(h.sessions.get_session(h.session.session_id, past_original).unwrap().is_some());
    assert_eq!(h.metrics.get(Counter::TelemetryAccepted), 1);
}

#[test]
fn unknown_session_is_a_validation_failure() {
    let h = harness();
    let err = h
        .service
        .record_event(&h.auth, &event(SessionId::generate(), TelemetryEventType::Heartbeat), base_time())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(h.metrics.get(Counter::TelemetryRejected), 1);
}

#[test]
fn foreign_session_reads_as_unknown() {
    let h = harness();
    let stranger = AuthContext {
        tenant_id: TenantId::generate(),
        user_id: UserId::generate(),
        request_id: None,
        client_ip: None,
        user_agent: None,
    };
    let err = h
        .service
        .record_event(&stranger, &event(h.session.session_id, TelemetryEventType::Heartbeat), base_time())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn session_end_removes_from_active_set() {
    let h = harness();
    h.service
        .record_event(
            &h.auth,
            &event(h.session.session_id, TelemetryEventType::SessionEnd),
            base_time(),
        )
        .unwrap();
    assert!(h
        .sessions
        .get_session(h.session.session_id, base_time())
        .unwrap()
        .is_none());
    assert!(h
        .sessions
        .scrub_active(h.auth.tenant_id, h.auth.user_id, base_time())
        .unwrap()
        .is_empty());
}

#[test]
fn fallback_updates_counters_and_session_record() {
    let h = harness();
    let mut fallback = event(h.session.session_id, TelemetryEventType::FallbackToHls);
    fallback.reason_code = Some(TelemetryReasonCode::WebrtcTimeout);
    h.service.record_event(&h.auth, &fallback, base_time()).unwrap();

    assert_eq!(h.metrics.get(Counter::FallbacksToHls), 1);
    let session = h.sessions.get_session(h.session.session_id, base_time()).unwrap().unwrap();
    assert_eq!(session.fallback_count, 1);
    assert_eq!(session.last_error.as_deref(), Some("webrtc_timeout"));
}

#[test]
fn tile_events_bump_their_counters() {
    let h = harness();
    h.service
        .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::TileStart), base_time())
        .unwrap();
    h.service
        .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::TileStop), base_time())
        .unwrap();
    assert_eq!(h.metrics.get(Counter::TileStarts), 1);
    assert_eq!(h.metrics.get(Counter::TileStops), 1);
}

#[test]
fn per_session_rate_limit_rejects_past_the_window_budget() {
    let h = harness();
    let now = base_time();
    for _ in 0..TELEMETRY_RATE_LIMIT {
        h.service
            .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::Heartbeat), now)
            .unwrap();
    }
    let err = h
        .service
        .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::Heartbeat), now)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);

    // A new window admits events again.
    let next_window = now + Duration::seconds(11);
    h.service
        .record_event(&h.auth, &event(h.session.session_id, TelemetryEventType::Heartbeat), next_window)
        .unwrap();
}
