// crates/vigil-server/src/health.rs
// ============================================================================
// Module: Health Monitor
// Description: Scheduled camera RTSP probes and NVR status checks.
// Purpose: Keep per-device health current and drive the alert lifecycle.
// Dependencies: tokio, vigil-core, vigil-devices, vigil-store
// ============================================================================

//! ## Overview
//! Two schedulers share one concurrency cap: the camera scheduler issues
//! short RTSP probes and the NVR scheduler runs vendor connection tests.
//! Probe outcomes upsert the current-health row, append to the bounded
//! history, and open or close the five-minute offline alert. NVR status
//! dominates its channels: channel validation only runs when the recorder
//! itself is reachable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Semaphore;

use vigil_core::CameraHealthStatus;
use vigil_core::CameraId;
use vigil_core::ChannelValidation;
use vigil_core::CredentialOwner;
use vigil_core::HealthHistoryEntry;
use vigil_core::NvrStatus;
use vigil_core::TenantId;
use vigil_devices::AdapterRegistry;
use vigil_devices::DeviceError;
use vigil_devices::NvrEndpoint;
use vigil_devices::rtsp;
use vigil_store::PostgresStore;
use vigil_store::cameras;
use vigil_store::health;
use vigil_store::nvrs;
use vigil_store::users;

use crate::metrics::ControlMetrics;
use crate::metrics::Counter;
use crate::vault::CredentialVault;
use crate::workers::Shutdown;
use crate::workers::spawn_worker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Camera probe interval.
pub const CAMERA_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// NVR probe interval.
pub const NVR_HEALTH_INTERVAL: Duration = Duration::from_secs(120);

/// How long a camera may go without a successful probe before the offline
/// alert opens.
pub const OFFLINE_ALERT_THRESHOLD: Duration = Duration::from_secs(300);

/// Alert kind for the five-minute offline rule.
pub const ALERT_KIND_OFFLINE: &str = "offline_over_5m";

// ============================================================================
// SECTION: Alert Rule
// ============================================================================

/// Decides whether the offline alert is due.
#[must_use]
pub fn offline_alert_due(
    status: CameraHealthStatus,
    last_success_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    if status == CameraHealthStatus::Online {
        return false;
    }
    match last_success_at {
        // Never-successful cameras alert once the rule's window has passed
        // since we cannot distinguish them from long-dead ones.
        None => true,
        Some(last_success) => now - last_success > OFFLINE_ALERT_THRESHOLD,
    }
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// The health monitor shared by both schedulers.
pub struct HealthMonitor {
    /// Relational store.
    store: Arc<PostgresStore>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Vendor adapter registry.
    registry: Arc<AdapterRegistry>,
    /// Counter sink.
    metrics: Arc<dyn ControlMetrics>,
    /// Shared probe concurrency cap.
    permits: Arc<Semaphore>,
}

impl HealthMonitor {
    /// Builds the monitor.
    #[must_use]
    pub fn new(
        store: Arc<PostgresStore>,
        vault: Arc<CredentialVault>,
        registry: Arc<AdapterRegistry>,
        metrics: Arc<dyn ControlMetrics>,
        max_inflight: usize,
    ) -> Self {
        Self {
            store,
            vault,
            registry,
            metrics,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Runs one camera scheduler tick across all tenants.
    pub async fn tick_cameras(self: Arc<Self>) {
        let store = Arc::clone(&self.store);
        let targets = tokio::task::spawn_blocking(move || {
            let tenants = store.with_global(users::list_tenants)?;
            let mut targets = Vec::new();
            for tenant in tenants {
                let listed = store.with_tenant(tenant.id, |tx| {
                    let filter = cameras::CameraFilter {
                        enabled_only: true,
                        limit: Some(500),
                        ..cameras::CameraFilter::default()
                    };
                    cameras::list_cameras(tx, &filter)
                })?;
                for camera in listed {
                    targets.push((tenant.id, camera));
                }
            }
            Ok::<_, vigil_store::PgStoreError>(targets)
        })
        .await;
        let targets = match targets {
            Ok(Ok(targets)) => targets,
            _ => return,
        };
        let mut handles = Vec::new();
        for (tenant_id, camera) in targets {
            let monitor = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = monitor.permits.acquire().await else {
                    return;
                };
                monitor.probe_camera(tenant_id, &camera).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Probes one camera and records the outcome.
    pub async fn probe_camera(&self, tenant_id: TenantId, camera: &vigil_core::Camera) {
        self.metrics.incr(Counter::HealthProbes);
        let rtsp_url = self.resolve_rtsp_url(tenant_id, camera).await;
        let credential =
            self.vault.fetch_credential(tenant_id, CredentialOwner::Camera(camera.id)).ok();

        let outcome = tokio::task::spawn_blocking(move || {
            rtsp::probe(&rtsp_url, credential.as_ref(), rtsp::RTSP_PROBE_TIMEOUT)
        })
        .await;
        let outcome = match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => rtsp::RtspProbeOutcome {
                status: CameraHealthStatus::StreamError,
                rtt_ms: 0,
                reason: Some(err.coarse_code().to_string()),
            },
            Err(_) => return,
        };

        let store = Arc::clone(&self.store);
        let camera_id = camera.id;
        let metrics = Arc::clone(&self.metrics);
        let recorded = tokio::task::spawn_blocking(move || {
            let now = OffsetDateTime::now_utc();
            store.with_tenant(tenant_id, |tx| {
                let current = health::record_probe(
                    tx,
                    tenant_id,
                    camera_id,
                    outcome.status,
                    outcome.reason.as_deref(),
                    now,
                )?;
                health::append_history(
                    tx,
                    tenant_id,
                    camera_id,
                    &HealthHistoryEntry {
                        at: now,
                        status: outcome.status,
                        reason: outcome.reason.clone(),
                        rtt_ms: Some(outcome.rtt_ms),
                    },
                )?;
                if outcome.status == CameraHealthStatus::Online {
                    health::close_alert(tx, camera_id, ALERT_KIND_OFFLINE, now)?;
                } else if offline_alert_due(current.status, current.last_success_at, now) {
                    health::open_alert(tx, tenant_id, camera_id, ALERT_KIND_OFFLINE, now)?;
                    metrics.incr(Counter::AlertsOpened);
                }
                Ok(())
            })
        })
        .await;
        if let Ok(Err(err)) = recorded {
            tracing::warn!(error = %err, "health probe persistence failed");
        }
    }

    /// Resolves the RTSP URL to probe: selected main profile, else the
    /// conventional device endpoint.
    async fn resolve_rtsp_url(&self, tenant_id: TenantId, camera: &vigil_core::Camera) -> String {
        let store = Arc::clone(&self.store);
        let camera_id = camera.id;
        let resolved = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| {
                let Some(selection) = cameras::get_stream_selection(tx, camera_id)? else {
                    return Ok(None);
                };
                let profiles = cameras::list_media_profiles(tx, camera_id)?;
                Ok(profiles
                    .into_iter()
                    .find(|profile| profile.token == selection.main_token)
                    .map(|profile| profile.rtsp_url))
            })
        })
        .await;
        match resolved {
            Ok(Ok(Some(url))) => url,
            _ => format!("rtsp://{}:{}/", camera.ip, camera.port),
        }
    }

    /// Runs one NVR scheduler tick across all tenants.
    pub async fn tick_nvrs(self: Arc<Self>) {
        let store = Arc::clone(&self.store);
        let targets = tokio::task::spawn_blocking(move || {
            let tenants = store.with_global(users::list_tenants)?;
            let mut targets = Vec::new();
            for tenant in tenants {
                let listed = store.with_tenant(tenant.id, |tx| nvrs::list_nvrs(tx, true))?;
                for nvr in listed {
                    targets.push((tenant.id, nvr));
                }
            }
            Ok::<_, vigil_store::PgStoreError>(targets)
        })
        .await;
        let targets = match targets {
            Ok(Ok(targets)) => targets,
            _ => return,
        };
        let mut handles = Vec::new();
        for (tenant_id, nvr) in targets {
            let monitor = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = monitor.permits.acquire().await else {
                    return;
                };
                monitor.probe_nvr(tenant_id, nvr).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Probes one NVR; channel validation only runs when reachable.
    async fn probe_nvr(&self, tenant_id: TenantId, nvr: vigil_core::Nvr) {
        self.metrics.incr(Counter::HealthProbes);
        let Some(adapter) = self.registry.resolve(nvr.vendor) else {
            return;
        };
        let Ok(credential) =
            self.vault.fetch_credential(tenant_id, CredentialOwner::Nvr(nvr.id))
        else {
            self.record_nvr_status(tenant_id, nvr.id, NvrStatus::Error).await;
            return;
        };
        let endpoint = NvrEndpoint {
            host: nvr.ip.to_string(),
            port: nvr.port,
            https: false,
        };

        let probe_endpoint = endpoint.clone();
        let probe_credential = credential.clone();
        let probe_adapter = Arc::clone(&adapter);
        let result = tokio::task::spawn_blocking(move || {
            probe_adapter.test_connection(&probe_endpoint, &probe_credential)
        })
        .await;
        let status = match result {
            Ok(Ok(())) => NvrStatus::Online,
            Ok(Err(DeviceError::Unauthorized)) => NvrStatus::AuthFailed,
            Ok(Err(DeviceError::Timeout(_) | DeviceError::Io(_))) => NvrStatus::Offline,
            Ok(Err(_)) => NvrStatus::Error,
            Err(_) => return,
        };
        self.record_nvr_status(tenant_id, nvr.id, status).await;

        if status != NvrStatus::Online {
            return;
        }
        // Recorder reachable: refresh channel validation from a listing.
        let listed = tokio::task::spawn_blocking(move || {
            adapter.list_channels(&endpoint, &credential)
        })
        .await;
        let Ok(Ok(listed)) = listed else {
            return;
        };
        let store = Arc::clone(&self.store);
        let nvr_id = nvr.id;
        let _ = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| {
                let known = nvrs::list_channels(tx, nvr_id)?;
                for channel in known {
                    let validation = if listed
                        .iter()
                        .any(|info| info.channel_ref == channel.channel_ref)
                    {
                        ChannelValidation::Ok
                    } else {
                        ChannelValidation::Error
                    };
                    nvrs::set_channel_validation(tx, channel.id, validation)?;
                }
                Ok(())
            })
        })
        .await;
    }

    /// Persists an NVR's observed status.
    async fn record_nvr_status(&self, tenant_id: TenantId, nvr_id: vigil_core::NvrId, status: NvrStatus) {
        let store = Arc::clone(&self.store);
        let _ = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| {
                nvrs::set_nvr_status(tx, nvr_id, status, OffsetDateTime::now_utc())
            })
        })
        .await;
    }

    /// Re-probes one camera on demand (the health-recheck endpoint).
    pub async fn recheck_camera(&self, tenant_id: TenantId, camera_id: CameraId) -> bool {
        let store = Arc::clone(&self.store);
        let camera = tokio::task::spawn_blocking(move || {
            store.with_tenant(tenant_id, |tx| cameras::get_camera(tx, camera_id))
        })
        .await;
        match camera {
            Ok(Ok(Some(camera))) => {
                self.probe_camera(tenant_id, &camera).await;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Workers
// ============================================================================

/// Spawns the camera health scheduler.
pub fn spawn_camera_health(
    monitor: Arc<HealthMonitor>,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    spawn_worker("camera-health", CAMERA_HEALTH_INTERVAL, shutdown, move || {
        let monitor = Arc::clone(&monitor);
        async move {
            monitor.tick_cameras().await;
        }
    })
}

/// Spawns the NVR health scheduler.
pub fn spawn_nvr_health(
    monitor: Arc<HealthMonitor>,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    spawn_worker("nvr-health", NVR_HEALTH_INTERVAL, shutdown, move || {
        let monitor = Arc::clone(&monitor);
        async move {
            monitor.tick_nvrs().await;
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    fn at(ts: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(ts).unwrap()
    }

    #[test]
    fn online_never_alerts() {
        assert!(!offline_alert_due(CameraHealthStatus::Online, None, at(1_000_000)));
    }

    #[test]
    fn offline_alerts_only_past_the_threshold() {
        let now = at(1_000_000);
        let recent = Some(at(1_000_000 - 200));
        assert!(!offline_alert_due(CameraHealthStatus::Offline, recent, now));
        let stale = Some(at(1_000_000 - 301));
        assert!(offline_alert_due(CameraHealthStatus::Offline, stale, now));
    }

    #[test]
    fn exact_threshold_does_not_alert() {
        let now = at(1_000_000);
        let boundary = Some(at(1_000_000 - 300));
        assert!(!offline_alert_due(CameraHealthStatus::AuthFailed, boundary, now));
    }
}
