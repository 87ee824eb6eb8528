// crates/vigil-core/src/core/live.rs
// ============================================================================
// Module: Live-View Contracts
// Description: Viewer sessions and the dual-path live-view response shape.
// Purpose: Define the broker's session records and client-facing contracts.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Live-view issuance returns a dual-path contract: WebRTC primary with an
//! HLS fallback, plus the fallback and telemetry policies the client follows.
//! Session records live in the hot store under a TTL; the types here are the
//! canonical shapes both the broker and the stores agree on.
//!
//! ## Invariants
//! - A user never holds more than [`MAX_SESSIONS_PER_USER`] live sessions.
//! - Repeated issuance for the same `(user, camera)` inside
//!   [`IDEMPOTENCY_WINDOW_SECS`] returns the original session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::CameraId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard cap on concurrent live sessions per user.
pub const MAX_SESSIONS_PER_USER: usize = 16;

/// Viewer session time-to-live in seconds.
pub const SESSION_TTL_SECS: u64 = 600;

/// Idempotent reissue window in seconds for a `(user, camera)` pair.
pub const IDEMPOTENCY_WINDOW_SECS: u64 = 10;

/// Stable error label returned when the session cap is exceeded.
pub const LIVE_LIMIT_ERROR: &str = "LIVE_LIMIT_EXCEEDED";

// ============================================================================
// SECTION: Session Records
// ============================================================================

/// Requested view mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Full-size single-camera view.
    Single,
    /// Multi-camera grid tile.
    Grid,
}

/// Stream quality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamQuality {
    /// Main (full-resolution) profile.
    Main,
    /// Sub (reduced) profile; the grid default.
    Sub,
}

impl StreamQuality {
    /// Returns the stable quality label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Sub => "sub",
        }
    }
}

/// A viewer session record held in the hot store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Viewing user.
    pub user_id: UserId,
    /// Viewed camera.
    pub camera_id: CameraId,
    /// Requested view mode.
    pub mode: ViewMode,
    /// Quality selected at issuance.
    pub selected_quality: StreamQuality,
    /// When the session was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last positive client signal.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
    /// When the session expires absent renewal.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// How many times the client fell back to HLS.
    pub fallback_count: u32,
    /// Last client-reported error reason, when any.
    pub last_error: Option<String>,
    /// Whether the viewer has the AI overlay enabled; drives demand refresh.
    #[serde(default)]
    pub overlay: bool,
}

// ============================================================================
// SECTION: Response Contracts
// ============================================================================

/// WebRTC connection parameters for the primary path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcPath {
    /// SFU signaling URL.
    pub sfu_url: String,
    /// Room to join.
    pub room_id: String,
    /// Signaling connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// HLS parameters for the fallback path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsPath {
    /// Playlist URL.
    pub playlist_url: String,
    /// Target end-to-end latency in milliseconds.
    pub target_latency_ms: u64,
}

/// Client fallback policy for the dual-path contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// WebRTC signaling connect timeout in milliseconds.
    pub webrtc_connect_timeout_ms: u64,
    /// First-media-track timeout in milliseconds.
    pub webrtc_track_timeout_ms: u64,
    /// Automatic retry attempts before falling back.
    pub max_auto_retries: u32,
    /// Backoff schedule between retries, in milliseconds.
    pub retry_backoff_ms: Vec<u64>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            webrtc_connect_timeout_ms: 4_000,
            webrtc_track_timeout_ms: 6_000,
            max_auto_retries: 2,
            retry_backoff_ms: vec![500, 2_000],
        }
    }
}

/// Telemetry policy handed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPolicy {
    /// Endpoint the client posts viewer events to.
    pub endpoint: String,
}

/// The dual-path live-view issuance response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStartResponse {
    /// Issued session id.
    pub session_id: SessionId,
    /// Quality selected at issuance.
    pub selected_quality: StreamQuality,
    /// Primary transport label; always `webrtc`.
    pub primary: &'static str,
    /// Fallback transport label; always `hls`.
    pub fallback: &'static str,
    /// WebRTC path parameters.
    pub webrtc: WebRtcPath,
    /// HLS path parameters.
    pub hls: HlsPath,
    /// Client fallback policy.
    pub fallback_policy: FallbackPolicy,
    /// Client telemetry policy.
    pub telemetry_policy: TelemetryPolicy,
}

// ============================================================================
// SECTION: Telemetry Events
// ============================================================================

/// Client-reported viewer event types (the closed allowed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEventType {
    /// WebRTC connected and produced media.
    WebrtcConnected,
    /// WebRTC failed; client is retrying or falling back.
    WebrtcFailed,
    /// Client switched to the HLS fallback.
    FallbackToHls,
    /// A grid tile started rendering.
    TileStart,
    /// A grid tile stopped rendering.
    TileStop,
    /// Playback stalled.
    Stall,
    /// Playback recovered after a stall.
    Recovered,
    /// Periodic liveness signal.
    Heartbeat,
    /// The viewer closed the session.
    SessionEnd,
}

impl TelemetryEventType {
    /// Returns the stable event label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebrtcConnected => "webrtc_connected",
            Self::WebrtcFailed => "webrtc_failed",
            Self::FallbackToHls => "fallback_to_hls",
            Self::TileStart => "tile_start",
            Self::TileStop => "tile_stop",
            Self::Stall => "stall",
            Self::Recovered => "recovered",
            Self::Heartbeat => "heartbeat",
            Self::SessionEnd => "session_end",
        }
    }

    /// Returns true when the event signals a healthy, attended session.
    #[must_use]
    pub const fn is_positive_signal(self) -> bool {
        matches!(
            self,
            Self::WebrtcConnected | Self::TileStart | Self::Recovered | Self::Heartbeat
        )
    }
}

/// Client-reported reason codes (the closed allowed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryReasonCode {
    /// No specific reason.
    None,
    /// WebRTC signaling timed out.
    WebrtcTimeout,
    /// Media track never arrived.
    TrackTimeout,
    /// Network-level failure.
    NetworkError,
    /// Media decode failure.
    DecodeError,
    /// Explicit user action.
    UserAction,
}

impl TelemetryReasonCode {
    /// Returns the stable reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WebrtcTimeout => "webrtc_timeout",
            Self::TrackTimeout => "track_timeout",
            Self::NetworkError => "network_error",
            Self::DecodeError => "decode_error",
            Self::UserAction => "user_action",
        }
    }
}

/// A client telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Subject session.
    pub session_id: SessionId,
    /// Event type from the allowed set.
    pub event_type: TelemetryEventType,
    /// Reason code from the allowed set.
    #[serde(default)]
    pub reason_code: Option<TelemetryReasonCode>,
    /// Client timestamp in Unix milliseconds.
    pub ts_unix_ms: i64,
}

/// Per-session telemetry rate limit: events per window.
pub const TELEMETRY_RATE_LIMIT: u32 = 40;

/// Telemetry rate-limit window in seconds.
pub const TELEMETRY_RATE_WINDOW_SECS: u64 = 10;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn response_serializes_dual_path_labels() {
        let response = LiveStartResponse {
            session_id: SessionId::generate(),
            selected_quality: StreamQuality::Sub,
            primary: "webrtc",
            fallback: "hls",
            webrtc: WebRtcPath {
                sfu_url: "wss://sfu.example/ws".to_string(),
                room_id: "cam-1".to_string(),
                connect_timeout_ms: 4_000,
            },
            hls: HlsPath {
                playlist_url: "https://media.example/cam-1/index.m3u8".to_string(),
                target_latency_ms: 4_000,
            },
            fallback_policy: FallbackPolicy::default(),
            telemetry_policy: TelemetryPolicy {
                endpoint: "/api/v1/live/events".to_string(),
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["primary"], "webrtc");
        assert_eq!(value["fallback"], "hls");
        assert_eq!(value["selected_quality"], "sub");
    }

    #[test]
    fn positive_signals_exclude_failures() {
        assert!(TelemetryEventType::Heartbeat.is_positive_signal());
        assert!(TelemetryEventType::WebrtcConnected.is_positive_signal());
        assert!(!TelemetryEventType::WebrtcFailed.is_positive_signal());
        assert!(!TelemetryEventType::SessionEnd.is_positive_signal());
    }
}
