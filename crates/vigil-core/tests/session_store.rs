// crates/vigil-core/tests/session_store.rs
// ============================================================================
// Module: Session Store Tests
// Description: Verify the in-memory session store honors broker semantics.
// Purpose: Pin idempotency, scrubbing, and TTL behavior at the trait seam.
// Dependencies: vigil-core, time
// ============================================================================

//! Session store trait-seam tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use time::Duration;
use time::OffsetDateTime;
use vigil_core::CameraId;
use vigil_core::IDEMPOTENCY_WINDOW_SECS;
use vigil_core::InMemorySessionStore;
use vigil_core::SESSION_TTL_SECS;
use vigil_core::SessionId;
use vigil_core::SessionStore;
use vigil_core::StreamQuality;
use vigil_core::TenantId;
use vigil_core::UserId;
use vigil_core::ViewMode;
use vigil_core::ViewerSession;

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

fn session(
    tenant_id: TenantId,
    user_id: UserId,
    camera_id: CameraId,
    now: OffsetDateTime,
) -> ViewerSession {
    ViewerSession {
        session_id: SessionId::generate(),
        tenant_id,
        user_id,
        camera_id,
        mode: ViewMode::Grid,
        selected_quality: StreamQuality::Sub,
        created_at: now,
        last_seen_at: now,
        expires_at: now + Duration::seconds(SESSION_TTL_SECS as i64),
        fallback_count: 0,
        last_error: None,
        overlay: false,
    }
}

#[test]
fn idempotent_lookup_inside_window_returns_original() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let tenant = TenantId::generate();
    let user = UserId::generate();
    let camera = CameraId::generate();
    let first = session(tenant, user, camera, now);
    store.create_session(&first).unwrap();

    let found = store
        .idempotent_session(tenant, user, camera, now + Duration::seconds(5))
        .unwrap();
    assert_eq!(found, Some(first.session_id));
}

#[test]
fn idempotent_lookup_past_window_returns_none() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let tenant = TenantId::generate();
    let user = UserId::generate();
    let camera = CameraId::generate();
    store.create_session(&session(tenant, user, camera, now)).unwrap();

    let later = now + Duration::seconds(IDEMPOTENCY_WINDOW_SECS as i64);
    assert_eq!(store.idempotent_session(tenant, user, camera, later).unwrap(), None);
}

#[test]
fn scrub_drops_expired_members_and_counts_survivors() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let tenant = TenantId::generate();
    let user = UserId::generate();

    for _ in 0..3 {
        store.create_session(&session(tenant, user, CameraId::generate(), now)).unwrap();
    }
    // One session issued much earlier, already past its TTL at scrub time.
    let stale_start = now - Duration::seconds(SESSION_TTL_SECS as i64 + 60);
    store.create_session(&session(tenant, user, CameraId::generate(), stale_start)).unwrap();

    assert_eq!(store.raw_active_len(tenant, user), 4);
    let live = store.scrub_active(tenant, user, now).unwrap();
    assert_eq!(live.len(), 3);
    assert_eq!(store.raw_active_len(tenant, user), 3);
}

#[test]
fn expired_session_reads_as_absent() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let sess = session(TenantId::generate(), UserId::generate(), CameraId::generate(), now);
    store.create_session(&sess).unwrap();

    let past_ttl = now + Duration::seconds(SESSION_TTL_SECS as i64 + 1);
    assert!(store.get_session(sess.session_id, past_ttl).unwrap().is_none());
}

#[test]
fn extend_pushes_expiry_forward() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let sess = session(TenantId::generate(), UserId::generate(), CameraId::generate(), now);
    store.create_session(&sess).unwrap();

    let midway = now + Duration::seconds(300);
    store.extend_session(sess.session_id, midway).unwrap();

    let past_original_ttl = now + Duration::seconds(SESSION_TTL_SECS as i64 + 1);
    assert!(store.get_session(sess.session_id, past_original_ttl).unwrap().is_some());
}

#[test]
fn remove_clears_record_and_active_membership() {
    let store = InMemorySessionStore::new();
    let now = base_time();
    let tenant = TenantId::generate();
    let user = UserId::generate();
    let sess = session(tenant, user, CameraId::generate(), now);
    store.create_session(&sess).unwrap();
    store.remove_session(&sess).unwrap();

    assert!(store.get_session(sess.session_id, now).unwrap().is_none());
    assert!(store.scrub_active(tenant, user, now).unwrap().is_empty());
}
