// crates/vigil-server/src/live.rs
// ============================================================================
// Module: Live-View Broker
// Description: Viewer session issuance with cap, scrub, and idempotency.
// Purpose: Bridge authorized viewers to the WebRTC/HLS dual-path contract.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! Issuance follows the broker sequence: scrub the caller's active set,
//! serve the idempotent session for a `(user, camera)` repeat inside the
//! window, enforce the hard per-user cap for new sessions, then mint and
//! persist atomically. The response always carries both paths; media-plane
//! availability never blocks issuance because the HLS URL is static.
//!
//! ## Invariants
//! - A user's active set never exceeds the cap after a successful call.
//! - A repeat inside the idempotency window returns the original session
//!   id even when the user sits at the cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::Duration;
use time::OffsetDateTime;

use vigil_core::CameraId;
use vigil_core::DomainError;
use vigil_core::FallbackPolicy;
use vigil_core::HlsPath;
use vigil_core::LiveStartResponse;
use vigil_core::MAX_SESSIONS_PER_USER;
use vigil_core::SESSION_TTL_SECS;
use vigil_core::SessionId;
use vigil_core::SessionStore;
use vigil_core::StreamQuality;
use vigil_core::TelemetryPolicy;
use vigil_core::ViewMode;
use vigil_core::ViewerSession;
use vigil_core::WebRtcPath;

use crate::auth::AuthContext;
use crate::metrics::ControlMetrics;
use crate::metrics::Counter;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Static endpoints baked into every issuance response.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// SFU signaling URL.
    pub sfu_url: String,
    /// HLS base URL; the camera path is appended.
    pub hls_base_url: String,
    /// Telemetry ingest endpoint handed to clients.
    pub telemetry_endpoint: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sfu_url: "wss://sfu.local/ws".to_string(),
            hls_base_url: "https://media.local/hls".to_string(),
            telemetry_endpoint: "/api/v1/live/events".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Issuance failures.
#[derive(Debug)]
pub enum LiveStartError {
    /// The caller sits at the session cap with no idempotent session.
    LimitExceeded {
        /// Live sessions counted after the scrub.
        active: usize,
    },
    /// Any other classified failure.
    Domain(DomainError),
}

impl From<DomainError> for LiveStartError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<vigil_core::HotStoreError> for LiveStartError {
    fn from(err: vigil_core::HotStoreError) -> Self {
        Self::Domain(err.into())
    }
}

// ============================================================================
// SECTION: Request
// ============================================================================

/// Issuance request after camera authorization.
#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    /// Authorized camera.
    pub camera_id: CameraId,
    /// Requested view mode.
    pub view_mode: ViewMode,
    /// Explicit quality request; absent picks the mode default.
    pub quality: Option<StreamQuality>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// The live-view session broker.
pub struct LiveSessionService {
    /// Session storage seam.
    sessions: Arc<dyn SessionStore>,
    /// Static response endpoints.
    config: LiveConfig,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
}

impl LiveSessionService {
    /// Builds the broker.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        config: LiveConfig,
        metrics: Arc<dyn ControlMetrics>,
    ) -> Self {
        Self {
            sessions,
            config,
            metrics,
        }
    }

    /// Returns the session storage seam (handlers touch sessions directly
    /// for overlay toggles).
    #[must_use]
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Issues (or idempotently re-issues) a viewer session.
    ///
    /// The caller has already authorized the camera under the auth
    /// context's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LiveStartError::LimitExceeded`] at the cap and classified
    /// failures otherwise.
    pub fn start_session(
        &self,
        auth: &AuthContext,
        request: &StartSessionRequest,
        now: OffsetDateTime,
    ) -> Result<LiveStartResponse, LiveStartError> {
        let live =
            self.sessions.scrub_active(auth.tenant_id, auth.user_id, now)?;

        // A repeat inside the window returns the original session, even at
        // the cap: no new capacity is consumed.
        if let Some(existing) = self.sessions.idempotent_session(
            auth.tenant_id,
            auth.user_id,
            request.camera_id,
            now,
        )? {
            if let Some(session) = self.sessions.get_session(existing, now)? {
                return Ok(self.build_response(&session));
            }
        }

        if live.len() >= MAX_SESSIONS_PER_USER {
            self.metrics.incr(Counter::LiveLimitRejections);
            return Err(LiveStartError::LimitExceeded {
                active: live.len(),
            });
        }

        let selected_quality = request.quality.unwrap_or(match request.view_mode {
            ViewMode::Grid => StreamQuality::Sub,
            ViewMode::Single => StreamQuality::Main,
        });
        let session = ViewerSession {
            session_id: SessionId::generate(),
            tenant_id: auth.tenant_id,
            user_id: auth.user_id,
            camera_id: request.camera_id,
            mode: request.view_mode,
            selected_quality,
            created_at: now,
            last_seen_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECS as i64),
            fallback_count: 0,
            last_error: None,
            overlay: false,
        };
        self.sessions.create_session(&session)?;
        self.metrics.incr(Counter::LiveSessionsIssued);
        Ok(self.build_response(&session))
    }

    /// Builds the dual-path response for a session record.
    fn build_response(&self, session: &ViewerSession) -> LiveStartResponse {
        LiveStartResponse {
            session_id: session.session_id,
            selected_quality: session.selected_quality,
            primary: "webrtc",
            fallback: "hls",
            webrtc: WebRtcPath {
                sfu_url: self.config.sfu_url.clone(),
                room_id: session.camera_id.to_string(),
                connect_timeout_ms: 4_000,
            },
            hls: HlsPath {
                playlist_url: format!(
                    "{}/{}/{}/index.m3u8",
                    self.config.hls_base_url,
                    session.camera_id,
                    session.selected_quality.as_str()
                ),
                target_latency_ms: 4_000,
            },
            fallback_policy: FallbackPolicy::default(),
            telemetry_policy: TelemetryPolicy {
                endpoint: self.config.telemetry_endpoint.clone(),
            },
        }
    }
}
