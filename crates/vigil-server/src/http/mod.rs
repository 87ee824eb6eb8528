// crates/vigil-server/src/http/mod.rs
// ============================================================================
// Module: HTTP Surface
// Description: Router assembly, auth extraction, and rate limiting.
// Purpose: Expose the versioned API with uniform auth and error envelopes.
// Dependencies: axum, vigil-core
// ============================================================================

//! ## Overview
//! The router mounts every `/api/v1` route group. Authentication runs in
//! the [`AuthContext`] extractor, so a handler that takes the context is
//! authenticated by construction; internal routes check the service token
//! instead. Per-IP rate limiting sits in front of everything as a fixed
//! window over an in-memory bucket map.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit_routes;
pub mod auth_routes;
pub mod camera_routes;
pub mod discovery_routes;
pub mod health_routes;
pub mod internal_routes;
pub mod license_routes;
pub mod live_routes;
pub mod nvr_routes;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::State;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::state::SharedState;

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Default per-IP request budget per window.
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 300;

/// Rate-limit window length.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// One caller's window state.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Window start instant.
    window_start: Instant,
    /// Requests seen in the window.
    count: u32,
}

/// Fixed-window per-IP rate limiter.
pub struct RateLimiter {
    /// Buckets by caller IP.
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    /// Requests allowed per window.
    max_requests: u32,
    /// Window length.
    window: Duration,
}

impl RateLimiter {
    /// Builds a limiter with the default budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW)
    }

    /// Builds a limiter with explicit limits (tests shrink them).
    #[must_use]
    pub fn with_limits(max_requests: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Admits or rejects a request; returns `Retry-After` seconds when
    /// rejected.
    pub fn check(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let Ok(mut buckets) = self.buckets.lock() else {
            return Ok(());
        };
        let bucket = buckets.entry(ip).or_insert(Bucket {
            window_start: now,
            count: 0,
        });
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        if bucket.count >= self.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        bucket.count += 1;
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate-limit middleware applied in front of every route.
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(retry_after) = state.rate_limiter.check(peer.ip(), Instant::now()) {
        let mut err = ApiError::new(
            vigil_core::ErrorKind::RateLimited,
            "rate_limited",
            "request rate exceeded",
        );
        err.retry_after_secs = Some(retry_after);
        return Err(err);
    }
    Ok(next.run(request).await)
}

// ============================================================================
// SECTION: Auth Extraction
// ============================================================================

impl FromRequestParts<SharedState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("missing_bearer"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthenticated("missing_bearer"))?;
        let mut context =
            state.auth.verify_access_token(token).map_err(ApiError::from)?;
        context.request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        context.user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        context.client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        Ok(context)
    }
}

/// Requires the internal service token on a request.
///
/// # Errors
///
/// Returns an auth failure when the token is absent or wrong, and a
/// not-found-shaped failure when no token is configured (internal surface
/// disabled).
pub fn require_service_token(state: &SharedState, parts: &axum::http::HeaderMap) -> Result<(), ApiError> {
    let presented = parts
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthenticated("missing_service_token"))?;
    if crate::auth::service_token_matches(state.config.service_token.as_deref(), presented) {
        Ok(())
    } else {
        Err(ApiError::unauthenticated("invalid_service_token"))
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
#[must_use]
pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        // Auth.
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/refresh", post(auth_routes::refresh))
        .route("/auth/logout", post(auth_routes::logout))
        .route("/auth/complete-reset", post(auth_routes::complete_reset))
        // Cameras.
        .route("/cameras", post(camera_routes::create).get(camera_routes::list))
        .route("/cameras/bulk", post(camera_routes::bulk_create))
        .route(
            "/cameras/{id}",
            get(camera_routes::get_one)
                .put(camera_routes::update)
                .delete(camera_routes::delete_one),
        )
        .route("/cameras/{id}/enable", post(camera_routes::enable))
        .route("/cameras/{id}/disable", post(camera_routes::disable))
        .route("/cameras/{id}/credentials", put(camera_routes::set_credentials))
        .route(
            "/cameras/{id}/media-profiles",
            get(camera_routes::list_profiles).put(camera_routes::replace_profiles),
        )
        .route("/cameras/{id}/stream-selection", put(camera_routes::set_stream_selection))
        .route("/cameras/{id}/validate-rtsp", post(camera_routes::validate_rtsp))
        // Camera groups.
        .route(
            "/camera-groups",
            post(camera_routes::create_group).get(camera_routes::list_groups),
        )
        .route("/camera-groups/{id}", delete(camera_routes::delete_group))
        .route("/camera-groups/{id}/members", put(camera_routes::replace_members))
        // NVRs.
        .route("/nvrs", post(nvr_routes::create).get(nvr_routes::list))
        .route("/nvrs/{id}", get(nvr_routes::get_one).delete(nvr_routes::delete_one))
        .route("/nvrs/{id}/test-connection", post(nvr_routes::test_connection))
        .route("/nvrs/{id}/discover-channels", post(nvr_routes::discover_channels))
        .route("/nvrs/{id}/validate-channels", post(nvr_routes::validate_channels))
        .route("/nvrs/{id}/provision-cameras", post(nvr_routes::provision_cameras))
        // Discovery.
        .route("/onvif/discovery-runs", post(discovery_routes::start_run))
        .route("/onvif/discovery-runs/{id}", get(discovery_routes::get_run))
        .route("/onvif/discovered-devices", get(discovery_routes::list_devices))
        .route("/onvif/discovered-devices/{id}/probe", post(discovery_routes::probe_device))
        // Health.
        .route("/cameras/health", get(health_routes::list_camera_health))
        .route("/cameras/{id}/health", get(health_routes::camera_health))
        .route("/cameras/{id}/health/history", get(health_routes::camera_history))
        .route("/cameras/{id}/health-recheck", post(health_routes::recheck))
        .route("/alerts/cameras", get(health_routes::camera_alerts))
        .route("/health/nvrs/summary", get(health_routes::nvr_summary))
        .route("/health/nvrs/{id}/channels", get(health_routes::nvr_channels))
        // License.
        .route("/license/status", get(license_routes::status))
        .route("/license/reload", post(license_routes::reload))
        // Audit.
        .route("/audit/events", get(audit_routes::query))
        .route("/audit/exports", post(audit_routes::export))
        // Live view.
        .route("/live/sessions", post(live_routes::start_session))
        .route("/live/{sid}/overlay/enable", post(live_routes::overlay_enable))
        .route("/live/{sid}/overlay/disable", post(live_routes::overlay_disable))
        .route("/live/events", post(live_routes::record_event))
        .route("/cameras/{id}/detections/latest", get(live_routes::latest_detection))
        // Internal (service token).
        .route("/internal/cameras/active", get(internal_routes::active_cameras))
        .route("/internal/cameras/{id}/snapshot", get(internal_routes::snapshot))
        .route("/internal/cameras/{id}/detections", post(internal_routes::put_detection))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state);
    Router::new().nest("/api/v1", api)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn rate_limiter_rejects_past_budget_with_retry_after() {
        let limiter = RateLimiter::with_limits(2, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.check(ip, now).is_ok());
        assert!(limiter.check(ip, now).is_ok());
        let retry_after = limiter.check(ip, now).unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn rate_limiter_resets_each_window() {
        let limiter = RateLimiter::with_limits(1, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.check(ip, now).is_ok());
        assert!(limiter.check(ip, now).is_err());
        let next_window = now + Duration::from_secs(61);
        assert!(limiter.check(ip, next_window).is_ok());
    }

    #[test]
    fn rate_limiter_tracks_ips_independently() {
        let limiter = RateLimiter::with_limits(1, Duration::from_secs(60));
        let now = Instant::now();
        let first: IpAddr = "10.0.0.3".parse().unwrap();
        let second: IpAddr = "10.0.0.4".parse().unwrap();
        assert!(limiter.check(first, now).is_ok());
        assert!(limiter.check(second, now).is_ok());
    }
}
