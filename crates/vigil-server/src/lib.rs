// crates/vigil-server/src/lib.rs
// ============================================================================
// Module: Vigil Server Library
// Description: Control-plane services, background workers, and HTTP API.
// Purpose: Compose every subsystem and run the process.
// Dependencies: all vigil crates, axum, tokio
// ============================================================================

//! ## Overview
//! The server crate is the composition root: it wires configuration into
//! the stores, the crypto seams, the domain services, the background
//! workers (license watcher, audit replayer, health schedulers, event
//! poller, demand sweeper), and the axum router. Every worker observes one
//! root shutdown signal and exits after its current unit.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod camera_ops;
pub mod directory;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod health;
pub mod http;
pub mod license;
pub mod live;
pub mod metrics;
pub mod nvr_ops;
pub mod overlay;
pub mod poller;
pub mod rbac;
pub mod state;
pub mod telemetry;
pub mod vault;
pub mod workers;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use vigil_config::AppConfig;
use vigil_core::EventSink;
use vigil_crypto::Keyring;
use vigil_devices::AdapterRegistry;
use vigil_hotstore::HotStore;
use vigil_media::MediaClient;
use vigil_store::PostgresStore;
use vigil_store::PostgresStoreConfig;

use crate::audit::AuditService;
use crate::auth::AuthService;
use crate::camera_ops::CameraOps;
use crate::discovery::DiscoveryService;
use crate::health::HealthMonitor;
use crate::http::RateLimiter;
use crate::license::LicenseManager;
use crate::live::LiveConfig;
use crate::live::LiveSessionService;
use crate::metrics::ControlMetrics;
use crate::metrics::NoopMetrics;
use crate::nvr_ops::NvrOps;
use crate::overlay::OverlayService;
use crate::poller::EventPoller;
use crate::rbac::RbacService;
use crate::state::AppState;
use crate::state::SharedState;
use crate::telemetry::TelemetryService;
use crate::vault::CredentialVault;
use crate::workers::shutdown_channel;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Process bootstrap and serving failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A backend could not be reached during bootstrap.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
    /// The HTTP listener failed.
    #[error("serve failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Builds the shared state from configuration, connecting every backend.
/// Also returns the event poller, which `run` hands to its worker.
///
/// # Errors
///
/// Returns [`ServerError::Bootstrap`] when a backend is unreachable or a
/// secret fails to parse.
pub async fn build_state(
    config: AppConfig,
) -> Result<(SharedState, Arc<EventPoller>), ServerError> {
    let metrics: Arc<dyn ControlMetrics> = Arc::new(NoopMetrics);

    let keyring = Arc::new(
        Keyring::from_spec(&config.master_keys, &config.active_master_key)
            .map_err(|err| ServerError::Bootstrap(err.to_string()))?,
    );

    let store_config = PostgresStoreConfig {
        connection: config.db.connection_string(),
        ..PostgresStoreConfig::default()
    };
    let store = tokio::task::spawn_blocking(move || PostgresStore::connect(&store_config))
        .await
        .map_err(|err| ServerError::Bootstrap(err.to_string()))?
        .map(Arc::new)
        .map_err(|err| ServerError::Bootstrap(err.to_string()))?;

    let hot = HotStore::connect(&config.redis_url, 16)
        .map_err(|err| ServerError::Bootstrap(err.to_string()))?;
    let hot = Arc::new(hot);

    let sink: Arc<dyn EventSink> = Arc::new(
        events::NatsEventSink::connect(&config.nats_url)
            .await
            .map_err(|err| ServerError::Bootstrap(err.to_string()))?,
    );

    let registry = Arc::new(
        AdapterRegistry::with_builtin().map_err(|err| ServerError::Bootstrap(err.to_string()))?,
    );
    let media = Arc::new(
        MediaClient::new(&config.media_url)
            .map_err(|err| ServerError::Bootstrap(err.to_string()))?,
    );

    let audit = Arc::new(
        AuditService::new(
            Arc::clone(&store) as Arc<dyn audit::AuditStore>,
            config.spool.dir.clone(),
            config.spool.max_bytes,
            Arc::clone(&metrics),
        )
        .map_err(|err| ServerError::Bootstrap(err.to_string()))?,
    );

    let license = Arc::new(LicenseManager::new(
        config.license.path.clone(),
        config.license.public_key_pem.clone(),
        Arc::clone(&store) as Arc<dyn vigil_core::UsageProvider>,
        Arc::clone(&audit),
        Arc::clone(&metrics),
        config.dev_mode,
        OffsetDateTime::now_utc(),
    ));

    let vault = Arc::new(CredentialVault::new(Arc::clone(&keyring), Arc::clone(&store)));
    let auth = Arc::new(AuthService::new(
        &config.jwt_secret,
        Arc::clone(&hot) as Arc<dyn vigil_core::TokenStore>,
        Arc::clone(&store) as Arc<dyn auth::UserDirectory>,
    ));
    let rbac = Arc::new(RbacService::new(
        Arc::clone(&store) as Arc<dyn vigil_core::GrantSource>,
    ));
    let live = Arc::new(LiveSessionService::new(
        Arc::clone(&hot) as Arc<dyn vigil_core::SessionStore>,
        LiveConfig {
            sfu_url: config.sfu_url.clone(),
            hls_base_url: config.hls_base_url.clone(),
            telemetry_endpoint: "/api/v1/live/events".to_string(),
        },
        Arc::clone(&metrics),
    ));
    let telemetry = Arc::new(TelemetryService::new(
        Arc::clone(&hot) as Arc<dyn vigil_core::SessionStore>,
        Arc::clone(&hot) as Arc<dyn vigil_core::RateWindow>,
        Arc::clone(&metrics),
    ));
    let overlay = Arc::new(OverlayService::new(
        Arc::clone(&hot) as Arc<dyn vigil_core::DemandRegistry>,
        Arc::clone(&hot) as Arc<dyn vigil_core::DetectionCache>,
    ));
    let cameras = Arc::new(CameraOps::new(
        Arc::clone(&store),
        Arc::clone(&vault),
        Arc::clone(&license),
        Arc::clone(&audit),
    ));
    let nvrs = Arc::new(NvrOps::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&vault),
        Arc::clone(&license),
        Arc::clone(&audit),
    ));
    let discovery_service = Arc::new(DiscoveryService::new(
        Arc::clone(&store),
        Arc::clone(&vault),
        Arc::clone(&audit),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&store),
        Arc::clone(&vault),
        Arc::clone(&registry),
        Arc::clone(&metrics),
        config.workers.health_max_inflight,
    ));

    let poller = Arc::new(EventPoller::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&vault),
        Arc::clone(&sink),
        Arc::clone(&metrics),
        config.workers.poller_max_inflight,
    ));

    let state = Arc::new(AppState {
        config,
        store,
        auth,
        rbac,
        audit,
        license,
        live,
        telemetry,
        overlay,
        cameras,
        nvrs,
        discovery: discovery_service,
        health: monitor,
        media,
        metrics,
        rate_limiter: Arc::new(RateLimiter::new()),
    });
    Ok((state, poller))
}

/// Runs the full control plane until interrupted.
///
/// # Errors
///
/// Returns [`ServerError`] for bootstrap or listener failures.
pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    let listen_port = config.listen_port;
    let (state, poller) = build_state(config).await?;

    let (shutdown_handle, shutdown) = shutdown_channel();

    // Background workers.
    let replayer = audit::spawn_replayer(Arc::clone(&state.audit), shutdown.clone());
    let license_watcher =
        license::spawn_license_watcher(Arc::clone(&state.license), shutdown.clone());
    let camera_health = health::spawn_camera_health(Arc::clone(&state.health), shutdown.clone());
    let nvr_health = health::spawn_nvr_health(Arc::clone(&state.health), shutdown.clone());
    let sweeper = overlay::spawn_demand_sweeper(Arc::clone(&state.overlay), shutdown.clone());
    let event_poller = poller::spawn_event_poller(poller, shutdown.clone());

    // HTTP listener.
    let router = http::build_router(Arc::clone(&state));
    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))?;
    tracing::info!(%addr, "control plane listening");

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    let result = serve.await.map_err(|err| ServerError::Serve(err.to_string()));

    // Fan out shutdown and drain the workers.
    shutdown_handle.trigger();
    let _ = replayer.await;
    let _ = camera_health.await;
    let _ = nvr_health.await;
    let _ = sweeper.await;
    let _ = event_poller.await;
    let _ = license_watcher.join();
    result
}
