// crates/vigil-core/src/interfaces/mod.rs
// ============================================================================
// Module: Core Interfaces
// Description: Trait seams between domain services and backing stores.
// Purpose: Let services run against hot-store, grant, and bus backends
//          without naming a concrete implementation.
// Dependencies: async-trait, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Domain services reach their backends through the traits below. Durable
//! implementations live in `vigil-hotstore` and `vigil-store`; in-memory
//! implementations in [`memory`] back the service-level tests and keep every
//! TTL decision explicit by threading `now` through the call.
//!
//! ## Invariants
//! - Implementations treat expired entries as absent; callers never see a
//!   record past its TTL.
//! - `SessionStore::create_session` is atomic across the session record, the
//!   idempotency key, and the active-set membership.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod memory;

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::detections::DetectionPayload;
use crate::core::detections::DetectionStream;
use crate::core::detections::StoredDetection;
use crate::core::error::DomainError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::CameraId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::live::ViewerSession;
use crate::core::permissions::GrantSet;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds a camera stays in the overlay demand set after a refresh.
pub const OVERLAY_DEMAND_TTL_MS: i64 = 20_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures raised by hot-store implementations.
#[derive(Debug, Clone, Error)]
pub enum HotStoreError {
    /// The backing store is unreachable or timed out.
    #[error("hot store unavailable: {0}")]
    Unavailable(String),
    /// A stored value failed to decode.
    #[error("hot store data corrupt: {0}")]
    Corrupt(String),
}

impl HotStoreError {
    /// Maps the failure onto the closed error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::DependencyUnavailable,
            Self::Corrupt(_) => ErrorKind::DataCorruption,
        }
    }
}

impl From<HotStoreError> for DomainError {
    fn from(err: HotStoreError) -> Self {
        Self::new(err.kind(), "hot_store", err.to_string())
    }
}

/// Failures raised by event-bus sinks.
#[derive(Debug, Clone, Error)]
pub enum EventSinkError {
    /// The bus rejected or never acknowledged the publish.
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Hot-store operations backing the live-view session broker.
pub trait SessionStore: Send + Sync {
    /// Persists a new session atomically: the session record under its TTL,
    /// the `(user, camera)` idempotency key, and the active-set membership.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn create_session(&self, session: &ViewerSession) -> Result<(), HotStoreError>;

    /// Loads a live session; expired sessions read as absent.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn get_session(
        &self,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<Option<ViewerSession>, HotStoreError>;

    /// Rewrites a session record, preserving its current expiry.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn update_session(&self, session: &ViewerSession) -> Result<(), HotStoreError>;

    /// Extends a session's TTL after a positive client signal.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn extend_session(
        &self,
        session_id: SessionId,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError>;

    /// Removes a session record and its active-set membership.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn remove_session(&self, session: &ViewerSession) -> Result<(), HotStoreError>;

    /// Returns the session issued for `(user, camera)` inside the idempotency
    /// window, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn idempotent_session(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        camera_id: CameraId,
        now: OffsetDateTime,
    ) -> Result<Option<SessionId>, HotStoreError>;

    /// Scrubs the user's active set, dropping members whose session record
    /// has expired, and returns the surviving session ids.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn scrub_active(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<SessionId>, HotStoreError>;
}

// ============================================================================
// SECTION: Overlay Demand
// ============================================================================

/// The time-scored overlay demand registry consumed by the AI collaborator.
pub trait DemandRegistry: Send + Sync {
    /// Records demand for a camera at the given instant.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn refresh(&self, camera_id: CameraId, now_ms: i64) -> Result<(), HotStoreError>;

    /// Returns cameras whose demand score lies within
    /// [`OVERLAY_DEMAND_TTL_MS`] of `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn active_cameras(&self, now_ms: i64) -> Result<Vec<CameraId>, HotStoreError>;

    /// Removes members with stale scores; returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn sweep(&self, now_ms: i64) -> Result<usize, HotStoreError>;
}

// ============================================================================
// SECTION: Detection Cache
// ============================================================================

/// Stream-keyed latest-detection cache with a short TTL.
pub trait DetectionCache: Send + Sync {
    /// Stores the latest detection for `(tenant, camera, stream)`.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn put(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        payload: &DetectionPayload,
        now_ms: i64,
    ) -> Result<(), HotStoreError>;

    /// Reads the latest detection, attaching `age_ms` relative to `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn latest(
        &self,
        tenant_id: TenantId,
        camera_id: CameraId,
        stream: DetectionStream,
        now_ms: i64,
    ) -> Result<Option<StoredDetection>, HotStoreError>;
}

// ============================================================================
// SECTION: Rate Window
// ============================================================================

/// Fixed-window counters for per-session and per-caller rate limits.
pub trait RateWindow: Send + Sync {
    /// Increments the counter for `key` in its current window and returns the
    /// count including this increment.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn increment(&self, key: &str, window_secs: u64, now_ms: i64) -> Result<u32, HotStoreError>;
}

// ============================================================================
// SECTION: Token Store
// ============================================================================

/// Opaque-token storage for refresh and password-reset flows.
///
/// Tokens are stored by hash only; implementations never see raw tokens.
pub trait TokenStore: Send + Sync {
    /// Stores a refresh-token hash for a user under a TTL.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn store_refresh(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError>;

    /// Consumes a refresh-token hash, returning its subject. Tokens are
    /// single-use; a second take of the same hash returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn take_refresh(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError>;

    /// Stores a password-reset token hash for a user under a TTL.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn store_reset(
        &self,
        token_hash: &str,
        tenant_id: TenantId,
        user_id: UserId,
        ttl_secs: u64,
        now: OffsetDateTime,
    ) -> Result<(), HotStoreError>;

    /// Consumes a password-reset token hash, returning its subject.
    ///
    /// # Errors
    ///
    /// Returns [`HotStoreError`] when the store is unavailable.
    fn take_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(TenantId, UserId)>, HotStoreError>;
}

// ============================================================================
// SECTION: Grant Source
// ============================================================================

/// Loads a user's merged role grants from the relational store.
pub trait GrantSource: Send + Sync {
    /// Resolves the effective grant set for `(tenant, user)`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn load_grants(&self, tenant_id: TenantId, user_id: UserId) -> Result<GrantSet, DomainError>;
}

// ============================================================================
// SECTION: Event Sink
// ============================================================================

/// At-least-once publisher for vendor-agnostic NVR events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one payload to the given subject.
    ///
    /// # Errors
    ///
    /// Returns [`EventSinkError`] when the bus rejects the publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), EventSinkError>;
}
