// crates/vigil-server/src/state.rs
// ============================================================================
// Module: Application State
// Description: Shared service handles threaded through the HTTP layer.
// Purpose: Assemble every subsystem once and pass them by reference.
// Dependencies: crate services, vigil-config, vigil-store
// ============================================================================

//! ## Overview
//! The state is the composition root's output: one `Arc` of shared service
//! handles. Process-wide singletons (license state, audit spool) are
//! initialized-once handles here rather than ambient globals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use vigil_config::AppConfig;
use vigil_media::MediaClient;
use vigil_store::PostgresStore;

use crate::audit::AuditService;
use crate::auth::AuthService;
use crate::camera_ops::CameraOps;
use crate::discovery::DiscoveryService;
use crate::health::HealthMonitor;
use crate::http::RateLimiter;
use crate::license::LicenseManager;
use crate::live::LiveSessionService;
use crate::metrics::ControlMetrics;
use crate::nvr_ops::NvrOps;
use crate::overlay::OverlayService;
use crate::rbac::RbacService;
use crate::telemetry::TelemetryService;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared application state.
pub struct AppState {
    /// Process configuration.
    pub config: AppConfig,
    /// Relational store.
    pub store: Arc<PostgresStore>,
    /// Identity service.
    pub auth: Arc<AuthService>,
    /// RBAC resolver.
    pub rbac: Arc<RbacService>,
    /// Audit pipeline.
    pub audit: Arc<AuditService>,
    /// License manager.
    pub license: Arc<LicenseManager>,
    /// Live-view broker.
    pub live: Arc<LiveSessionService>,
    /// Telemetry ingest.
    pub telemetry: Arc<TelemetryService>,
    /// Overlay demand and detections.
    pub overlay: Arc<OverlayService>,
    /// Camera operations.
    pub cameras: Arc<CameraOps>,
    /// NVR operations.
    pub nvrs: Arc<NvrOps>,
    /// Discovery service.
    pub discovery: Arc<DiscoveryService>,
    /// Health monitor (shared with its workers).
    pub health: Arc<HealthMonitor>,
    /// Media-plane client.
    pub media: Arc<MediaClient>,
    /// Counter sink.
    pub metrics: Arc<dyn ControlMetrics>,
    /// Per-IP request rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
}

/// The shared state handle the routers consume.
pub type SharedState = Arc<AppState>;
