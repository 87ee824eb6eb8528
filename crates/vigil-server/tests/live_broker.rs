// crates/vigil-server/tests/live_broker.rs
// ============================================================================
// Module: Live Broker Tests
// Description: Session cap, idempotency, scrubbing, and contract shape.
// Purpose: Pin the issuance sequence end to end at the service seam.
// Dependencies: vigil-server, vigil-core
// ============================================================================

//! Live-view broker tests against the in-memory session store.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::sync::Arc;

use time::Duration;
use time::OffsetDateTime;
use vigil_core::CameraId;
use vigil_core::InMemorySessionStore;
use vigil_core::MAX_SESSIONS_PER_USER;
use vigil_core::SESSION_TTL_SECS;
use vigil_core::SessionStore;
use vigil_core::StreamQuality;
use vigil_core::TenantId;
use vigil_core::UserId;
use vigil_core::ViewMode;
use vigil_server::auth::AuthContext;
use vigil_server::live::LiveConfig;
use vigil_server::live::LiveSessionService;
use vigil_server::live::LiveStartError;
use vigil_server::live::StartSessionRequest;
use vigil_server::metrics::CountingMetrics;
use vigil_server::metrics::Counter;

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

fn auth_context() -> AuthContext {
    AuthContext {
        tenant_id: TenantId::generate(),
        user_id: UserId::generate(),
        request_id: None,
        client_ip: None,
        user_agent: None,
    }
}

fn service() -> (LiveSessionService, Arc<InMemorySessionStore>, Arc<CountingMetrics>) {
    let store = Arc::new(InMemorySessionStore::new());
    let metrics = Arc::new(CountingMetrics::new());
    let service = LiveSessionService::new(
        Arc::clone(&store) as Arc<dyn vigil_core::SessionStore>,
        LiveConfig::default(),
        Arc::clone(&metrics) as Arc<dyn vigil_server::metrics::ControlMetrics>,
    );
    (service, store, metrics)
}

fn grid_request(camera_id: CameraId) -> StartSessionRequest {
    StartSessionRequest {
        camera_id,
        view_mode: ViewMode::Grid,
        quality: Some(StreamQuality::Sub),
    }
}

#[test]
fn issues_session_with_dual_path_contract() {
    let (service, _, _) = service();
    let auth = auth_context();
    let response =
        service.start_session(&auth, &grid_request(CameraId::generate()), base_time()).unwrap();
    assert_eq!(response.primary, "webrtc");
    assert_eq!(response.fallback, "hls");
    assert_eq!(response.selected_quality, StreamQuality::Sub);
    assert!(response.hls.playlist_url.ends_with("/sub/index.m3u8"));
    assert!(!response.fallback_policy.retry_backoff_ms.is_empty());
    assert_eq!(response.telemetry_policy.endpoint, "/api/v1/live/events");
}

#[test]
fn single_view_defaults_to_main_quality() {
    let (service, _, _) = service();
    let auth = auth_context();
    let request = StartSessionRequest {
        camera_id: CameraId::generate(),
        view_mode: ViewMode::Single,
        quality: None,
    };
    let response = service.start_session(&auth, &request, base_time()).unwrap();
    assert_eq!(response.selected_quality, StreamQuality::Main);
}

#[test]
fn accepts_session_fifteen_then_rejects_seventeenth() {
    let (service, store, metrics) = service();
    let auth = auth_context();
    let now = base_time();
    for _ in 0..(MAX_SESSIONS_PER_USER - 1) {
        service.start_session(&auth, &grid_request(CameraId::generate()), now).unwrap();
    }
    // Session 16 still fits.
    service.start_session(&auth, &grid_request(CameraId::generate()), now).unwrap();
    assert_eq!(store.raw_active_len(auth.tenant_id, auth.user_id), MAX_SESSIONS_PER_USER);

    // Session 17 (a new camera) hits the cap.
    let err = service
        .start_session(&auth, &grid_request(CameraId::generate()), now)
        .unwrap_err();
    match err {
        LiveStartError::LimitExceeded { active } => assert_eq!(active, MAX_SESSIONS_PER_USER),
        LiveStartError::Domain(err) => unreachable!("unexpected domain error: {err}"),
    }
    assert_eq!(metrics.get(Counter::LiveLimitRejections), 1);
}

#[test]
fn repeat_within_window_returns_same_session_even_at_cap() {
    let (service, _, _) = service();
    let auth = auth_context();
    let now = base_time();
    for _ in 0..(MAX_SESSIONS_PER_USER - 1) {
        service.start_session(&auth, &grid_request(CameraId::generate()), now).unwrap();
    }
    let camera = CameraId::generate();
    let first = service.start_session(&auth, &grid_request(camera), now).unwrap();
    let repeat = service
        .start_session(&auth, &grid_request(camera), now + Duration::seconds(5))
        .unwrap();
    assert_eq!(first.session_id, repeat.session_id);
}

#[test]
fn repeat_past_window_mints_a_new_session() {
    let (service, _, _) = service();
    let auth = auth_context();
    let now = base_time();
    let camera = CameraId::generate();
    let first = service.start_session(&auth, &grid_request(camera), now).unwrap();
    let later = now + Duration::seconds(11);
    let second = service.start_session(&auth, &grid_request(camera), later).unwrap();
    assert_ne!(first.session_id, second.session_id);
}

#[test]
fn expired_sessions_are_scrubbed_before_the_cap_check() {
    let (service, store, _) = service();
    let auth = auth_context();
    let early = base_time();
    for _ in 0..MAX_SESSIONS_PER_USER {
        service.start_session(&auth, &grid_request(CameraId::generate()), early).unwrap();
    }
    // All sixteen have expired by now; the scrub frees the whole set.
    let later = early + Duration::seconds(SESSION_TTL_SECS as i64 + 5);
    let response =
        service.start_session(&auth, &grid_request(CameraId::generate()), later).unwrap();
    assert!(store
        .get_session(response.session_id, later)
        .unwrap()
        .is_some());
    assert_eq!(store.raw_active_len(auth.tenant_id, auth.user_id), 1);
}

#[test]
fn cap_never_exceeded_under_interleaved_issuance() {
    let (service, store, _) = service();
    let auth = auth_context();
    let now = base_time();
    for _ in 0..40 {
        let _ = service.start_session(&auth, &grid_request(CameraId::generate()), now);
    }
    assert!(store.raw_active_len(auth.tenant_id, auth.user_id) <= MAX_SESSIONS_PER_USER);
}
