// crates/vigil-core/src/interfaces/memory.rs
// ============================================================================
// Module: In-Memory Interface Implementations
// Description: Mutex-backed implementations of the core trait seams.
// Purpose: Back service-level tests without live Redis, Postgres, or NATS.
// Dependencies: async-trait, time
// ============================================================================

//! ## Overview
//! Every trait in [`crate::interfaces`] has an in-memory implementation here.
//! TTL behavior mirrors the durable backends: expiry is decided against the
//! `now` the caller threads through, so tests control the clock completely.
//! The event sink additionally supports scripted failures for retry tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use time::Duration;
use time::OffsetDateTime;

use crate::core::detections::DETECTION_TTL_SECS;
use crate::core::detections::DetectionPayload;
use crate::core::detections::DetectionStream;
use crate::core::detections::StoredDetection;
use crate::core::error::DomainError;
use crate::core::identifiers::CameraId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::license::UsageProvider;
use crate::core::live::IDEMPOTENCY_WINDOW_SECS;
use crate::core::live::SESSION_TTL_SECS;
use crate::core::live::ViewerSession;
use crate::interfaces::DemandRegistry;
use crate::interfaces::DetectionCache;
use crate::interfaces::EventSink;
use crate::interfaces::EventSinkError;
use crate::interfaces::HotStoreError;
use crate::interfaces::OVERLAY_DEMAND_TTL_MS;
use crate::interfaces::RateWindow;
use crate::interfaces::SessionStore;
use crate::interfaces::TokenStore;

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Internal state for [`InMemorySessionStore`].
#[derive(Debug, Default)]
struct SessionStoreInner {
    /// Session records by id.
    sessions: HashMap<SessionId, ViewerSession>,
    /// Idempotency keys with their issue time.
    idempotency: HashMap<(TenantId, UserId, CameraId), (SessionId, OffsetDateTime)>,
    /// Active-set membership per `(tenant, user)`.
    active: HashMap<(TenantId, UserId), BTreeSet<SessionId>>,
}

/// In-memory session store for tests.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Guarded store state.
    inner: Mutex<SessionStoreInner>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw active-set size without scrubbing (test inspection).
    #[must_use]
    pub fn raw_active_len(&self, tenant_id: TenantId, user_id: UserId) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner.active.get(&(tenant_id, user_id)).map(BTreeSet::len).unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Locks the inner state, mapping poisoning onto an unavailable error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionStoreInner>, HotStoreError> {
        self.inner.lock().map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut inner = self.lock()?;
        inner.sessions.insert(session.session_id, session.clone());
        inner.idempotency.insert(
            (session.tenant_id, session.user_id, session.camera_id),
            (session.session_id, session.created_at),
        );
        inner
            .active
            .entry((session.tenant_id, session.user_id))
            .or_default()
            .insert(session.session_id);
        Ok(())
    }

    fn get_session(
        &self,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<Option<ViewerSession>, HotStoreError> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .get(&session_id)
            .filter(|session| session.expires_at > now)
            .cloned())
    }

    fn update_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut inner = self.lock()?;
        inner.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    fn extend_session(
        &self,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        let mut inner = self.lock()?;
        if let Some(session) = inner.sessions.get_mut(&session_id) {
            session.last_seen_at = now;
            session.expires_at = now + Duration::seconds(SESSION_TTL_SECS as i64);
        }
        Ok(())
    }

    fn remove_session(&self, session: &ViewerSession) -> Result<(), HotStoreError> {
        let mut inner = self.lock()?;
        inner.sessions.remove(&session.session_id);
        if let Some(members) = inner.active.get_mut(&(session.tenant_id, session.user_id)) {
            members.remove(&session.session_id);
        }
        Ok(())
    }

    fn idempotent_session(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        camera_id: CameraId,
        now: OffsetDateTime,
    ) -> Result<Option<SessionId>, HotStoreError> {
        let inner = self.lock()?;
        let Some((session_id, issued_at)) =
            inner.idempotency.get(&(tenant_id, user_id, camera_id))
        else {
            return Ok(None);
        };
        let window = Duration::seconds(IDEMPOTENCY_WINDOW_SECS as i64);
        if now - *issued_at >= window {
            return Ok(None);
        }
        let live = inner
            .sessions
            .get(session_id)
            .is_some_and(|session| session.expires_at > now);
        Ok(live.then_some(*session_id))
    }

    fn scrub_active(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<SessionId>, HotStoreError> {
        let mut inner = self.lock()?;
        let SessionStoreInner {
            sessions, active, ..
        } = &mut *inner;
        let Some(members) = active.get_mut(&(tenant_id, user_id)) else {
            return Ok(Vec::new());
        };
        members.retain(|session_id| {
            sessions.get(session_id).is_some_and(|session| session.expires_at > now)
        });
        Ok(members.iter().copied().collect())
    }
}

// ============================================================================
// SECTION: Demand Registry
// ============================================================================

/// In-memory overlay demand registry for tests.
#[derive(Debug, Default)]
pub struct InMemoryDemandRegistry {
    /// Camera to last-refresh unix-ms.
    scores: Mutex<BTreeMap<CameraId, i64>>,
}

impl InMemoryDemandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DemandRegistry for InMemoryDemandRegistry {
    fn refresh(&self, camera_id: CameraId, now_ms: i64) -> Result<(), HotStoreError> {
        let mut scores = self
            .scores
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        scores.insert(camera_id, now_ms);
        Ok(())
    }

    fn active_cameras(&self, now_ms: i64) -> Result<Vec<CameraId>, HotStoreError> {
        let scores = self
            .scores
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(scores
            .iter()
            .filter(|(_, score)| now_ms - **score < OVERLAY_DEMAND_TTL_MS)
            .map(|(camera, _)| *camera)
            .collect())
    }

    fn sweep(&self, now_ms: i64) -> Result<usize, HotStoreError> {
        let mut scores = self
            .scores
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        let before = scores.len();
        scores.retain(|_, score| now_ms - *score < OVERLAY_DEMAND_TTL_MS);
        Ok(before - scores.len())
    }
}

// ============================================================================
// SECTION: Detection Cache
// ============================================================================

/// In-memory detection cache for tests.
#[derive(Debug, Default)]
pub struct InMemoryDetectionCache {
    /// Latest payload and write time per `(tenant, camera, stream)`.
    entries: Mutex<HashMap<(TenantId, CameraId, DetectionStream), (DetectionPayload, i64)>>,
}

impl InMemoryDetectionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectionCache for InMemoryDetectionCache {
    fn put(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        payload: &DetectionPayload,
        now_ms: i64,
    ) -> Result<(), HotStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        entries.insert((tenant_id, camera_id, stream), (payload.clone(), now_ms));
        Ok(())
    }

    fn latest(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        now_ms: i64,
    ) -> Result<Option<StoredDetection>, HotStoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        let Some((payload, written_ms)) = entries.get(&(tenant_id, camera_id, stream)) else {
            return Ok(None);
        };
        let ttl_ms = (DETECTION_TTL_SECS * 1_000) as i64;
        if now_ms - written_ms >= ttl_ms {
            return Ok(None);
        }
        Ok(Some(StoredDetection {
            payload: payload.clone(),
            age_ms: now_ms - payload.ts_unix_ms,
        }))
    }
}

// ============================================================================
// SECTION: Rate Window
// ============================================================================

/// In-memory fixed-window rate counter for tests.
#[derive(Debug, Default)]
pub struct InMemoryRateWindow {
    /// Window start and count per key.
    windows: Mutex<HashMap<String, (i64, u32)>>,
}

impl InMemoryRateWindow {
    /// Creates an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateWindow for InMemoryRateWindow {
    fn increment(&self, key: &str, window_secs: u64, now_ms: i64) -> Result<u32, HotStoreError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        let window_ms = (window_secs * 1_000) as i64;
        let entry = windows.entry(key.to_string()).or_insert((now_ms, 0));
        if now_ms - entry.0 >= window_ms {
            *entry = (now_ms, 0);
        }
        entry.1 = entry.1.saturating_add(1);
        Ok(entry.1)
    }
}

// ============================================================================
// SECTION: Token Store
// ============================================================================

/// In-memory refresh/reset token store for tests.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    /// Refresh-token hashes to subject and expiry.
    refresh: Mutex<HashMap<String, (TenantId, UserId, OffsetDateTime)>>,
    /// Reset-token hashes to subject and expiry.
    reset: Mutex<HashMap<String, (TenantId, UserId, OffsetDateTime)>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Takes a live token from a hash map, honoring expiry.
fn take_token(
    map: &Mutex<HashMap<String, (TenantId, UserId, OffsetDateTime)>>,
    token_hash: &str,
    now: OffsetDateTime,
) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
    let mut map =
        map.lock().map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
    let Some((tenant_id, user_id, expires_at)) = map.remove(token_hash) else {
        return Ok(None);
    };
    if expires_at <= now {
        return Ok(None);
    }
    Ok(Some((tenant_id, user_id)))
}

impl TokenStore for InMemoryTokenStore {
    fn store_refresh(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        let mut refresh = self
            .refresh
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        let expires_at = now + Duration::seconds(ttl_secs as i64);
        refresh.insert(token_hash.to_string(), (tenant_id, user_id, expires_at));
        Ok(())
    }

    fn take_refresh(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
        take_token(&self.refresh, token_hash, now)
    }

    fn store_reset(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError> {
        let mut reset = self
            .reset
            .lock()
            .map_err(|_| HotStoreError::Unavailable("lock poisoned".to_string()))?;
        let expires_at = now + Duration::seconds(ttl_secs as i64);
        reset.insert(token_hash.to_string(), (tenant_id, user_id, expires_at));
        Ok(())
    }

    fn take_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError> {
        take_token(&self.reset, token_hash, now)
    }
}

// ============================================================================
// SECTION: Event Sink
// ============================================================================

/// In-memory event sink that records publishes and can script failures.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    /// Recorded `(subject, payload)` publishes.
    published: Mutex<Vec<(String, Vec<u8>)>>,
    /// Remaining publishes to fail before succeeding again.
    fail_remaining: AtomicU32,
}

impl InMemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `count` publishes to fail.
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Returns the recorded publishes.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().map(|published| published.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), EventSinkError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EventSinkError::Unavailable("scripted failure".to_string()));
        }
        self.published
            .lock()
            .map_err(|_| EventSinkError::Unavailable("lock poisoned".to_string()))?
            .push((subject.to_string(), payload));
        Ok(())
    }
}

// ============================================================================
// SECTION: Usage Provider
// ============================================================================

/// Static usage counts for license-gate tests.
#[derive(Debug, Default)]
pub struct StaticUsage {
    /// Reported camera count.
    pub cameras: AtomicU32,
    /// Reported NVR count.
    pub nvrs: AtomicU32,
}

impl StaticUsage {
    /// Creates a usage provider with the given counts.
    #[must_use]
    pub fn new(cameras: u32, nvrs: u32) -> Self {
        Self {
            cameras: AtomicU32::new(cameras),
            nvrs: AtomicU32::new(nvrs),
        }
    }
}

impl UsageProvider for StaticUsage {
    fn camera_count(&self, _tenant_id: TenantId) -> Result<u32, DomainError> {
        Ok(self.cameras.load(Ordering::SeqCst))
    }

    fn nvr_count(&self, _tenant_id: TenantId) -> Result<u32, DomainError> {
        Ok(self.nvrs.load(Ordering::SeqCst))
    }
}
