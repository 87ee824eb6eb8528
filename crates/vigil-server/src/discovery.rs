// crates/vigil-server/src/discovery.rs
// ============================================================================
// Module: Discovery Service
// Description: Async WS-Discovery runs and ONVIF device probing.
// Purpose: Turn multicast answers into persisted discovered devices and
//          enrich them on demand with authenticated probes.
// Dependencies: vigil-core, vigil-devices, vigil-store
// ============================================================================

//! ## Overview
//! `start_discovery` persists a running job and returns immediately; the
//! scan happens on a background task bounded by the discovery timeout and
//! the per-run device cap. `probe_device` unwraps the bootstrap ONVIF
//! credential and runs the full WS-Security probe sequence, persisting
//! credential-stripped results and a coarse error classification, and
//! emitting an audit event either way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use vigil_core::AuditEventParams;
use vigil_core::AuditResult;
use vigil_core::CredentialOwner;
use vigil_core::DeviceId;
use vigil_core::DiscoveredDevice;
use vigil_core::DiscoveryRun;
use vigil_core::DiscoveryRunId;
use vigil_core::DiscoveryRunStatus;
use vigil_core::DomainError;
use vigil_core::SiteId;
use vigil_core::TenantId;
use vigil_devices::OnvifClient;
use vigil_devices::wsdiscovery;
use vigil_store::PostgresStore;
use vigil_store::discovery;

use crate::audit::AuditService;
use crate::auth::AuthContext;
use crate::vault::CredentialVault;

// ============================================================================
// SECTION: Service
// ============================================================================

/// The discovery service.
pub struct DiscoveryService {
    /// Relational store.
    store: Arc<PostgresStore>,
    /// Credential vault for bootstrap credentials.
    vault: Arc<CredentialVault>,
    /// Audit pipeline.
    audit: Arc<AuditService>,
}

impl DiscoveryService {
    /// Builds the service.
    #[must_use]
    pub fn new(
        store: Arc<PostgresStore>,
        vault: Arc<CredentialVault>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            vault,
            audit,
        }
    }

    /// Starts an asynchronous discovery run and returns it immediately.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the run row cannot be created.
    pub fn start_discovery(
        self: Arc<Self>,
        auth: &AuthContext,
        site_id: Option<SiteId>,
        now: OffsetDateTime,
    ) -> Result<DiscoveryRun, DomainError> {
        let tenant_id = auth.tenant_id;
        let run = self
            .store
            .with_tenant(tenant_id, |tx| discovery::create_run(tx, tenant_id, site_id, now))
            .map_err(DomainError::from)?;

        let service = Arc::clone(&self);
        let run_id = run.id;
        let _scan = tokio::task::spawn_blocking(move || {
            service.run_scan(tenant_id, run_id);
        });
        Ok(run)
    }

    /// Executes the bounded multicast scan and persists its findings.
    fn run_scan(&self, tenant_id: TenantId, run_id: DiscoveryRunId) {
        let scanned = wsdiscovery::discover(
            wsdiscovery::DISCOVERY_TIMEOUT,
            wsdiscovery::MAX_DEVICES_PER_RUN,
        );
        let now = OffsetDateTime::now_utc();
        let (status, device_count, error_count) = match scanned {
            Ok(hits) => {
                let mut stored = 0_u32;
                let mut errors = 0_u32;
                for hit in hits {
                    let Some(ipv4) = hit.ipv4() else {
                        errors += 1;
                        continue;
                    };
                    let (profile_s, profile_t, profile_g) = hit.profile_hints();
                    let device = DiscoveredDevice {
                        id: DeviceId::generate(),
                        run_id,
                        tenant_id,
                        ip: std::net::IpAddr::V4(ipv4),
                        xaddrs: hit.xaddrs.clone(),
                        profile_s,
                        profile_t,
                        profile_g,
                        capabilities: serde_json::json!({}),
                        media_profiles: serde_json::json!([]),
                        rtsp_uris: serde_json::json!([]),
                        last_error_code: None,
                    };
                    let upserted = self
                        .store
                        .with_tenant(tenant_id, |tx| discovery::upsert_device(tx, &device));
                    match upserted {
                        Ok(()) => stored += 1,
                        Err(_) => errors += 1,
                    }
                }
                let status = if errors == 0 {
                    DiscoveryRunStatus::Completed
                } else if stored > 0 {
                    DiscoveryRunStatus::PartiallyCompleted
                } else {
                    DiscoveryRunStatus::Failed
                };
                (status, stored, errors)
            }
            Err(err) => {
                tracing::warn!(error = %err, "ws-discovery scan failed");
                (DiscoveryRunStatus::Failed, 0, 1)
            }
        };
        let finished = self.store.with_tenant(tenant_id, |tx| {
            discovery::finish_run(tx, run_id, status, device_count, error_count, now)
        });
        if let Err(err) = finished {
            tracing::error!(error = %err, "discovery run finish failed");
        }
    }

    /// Loads a run for status polling.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown runs.
    pub fn get_run(
        &self,
        auth: &AuthContext,
        run_id: DiscoveryRunId,
    ) -> Result<DiscoveryRun, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| discovery::get_run(tx, run_id))
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("run_missing"))
    }

    /// Lists discovered devices, optionally for one run.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down.
    pub fn list_devices(
        &self,
        auth: &AuthContext,
        run_id: Option<DiscoveryRunId>,
    ) -> Result<Vec<DiscoveredDevice>, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| discovery::list_devices(tx, run_id))
            .map_err(DomainError::from)
    }

    /// Probes a discovered device with the bootstrap ONVIF credential.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown devices and classified device failures
    /// otherwise; every outcome emits one audit event.
    pub fn probe_device(
        &self,
        auth: &AuthContext,
        device_id: DeviceId,
        now: OffsetDateTime,
    ) -> Result<DiscoveredDevice, DomainError> {
        let tenant_id = auth.tenant_id;
        let mut device = self
            .store
            .with_tenant(tenant_id, |tx| discovery::get_device(tx, device_id))
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("device_missing"))?;

        let credential = self
            .vault
            .fetch_credential(tenant_id, CredentialOwner::OnvifBootstrap(device_id))?;
        let endpoint = device
            .xaddrs
            .first()
            .cloned()
            .unwrap_or_else(|| format!("http://{}/onvif/device_service", device.ip));

        let probed = OnvifClient::new(&endpoint, &credential.username, &credential.password)
            .and_then(|client| client.probe());
        let (result, reason_code) = match probed {
            Ok(report) => {
                device.capabilities = serde_json::json!({
                    "manufacturer": report.info.manufacturer,
                    "model": report.info.model,
                    "firmware": report.info.firmware,
                    "serial": report.info.serial,
                    "media_xaddr": report.media_xaddr,
                });
                device.media_profiles = serde_json::to_value(&report.profiles)
                    .unwrap_or_else(|_| serde_json::json!([]));
                device.rtsp_uris = serde_json::to_value(&report.stream_uris)
                    .unwrap_or_else(|_| serde_json::json!([]));
                device.last_error_code = None;
                (AuditResult::Success, None)
            }
            Err(err) => {
                let code = err.coarse_code();
                device.last_error_code = Some(code.to_string());
                (AuditResult::Failure, Some(code.to_string()))
            }
        };

        self.store
            .with_tenant(tenant_id, |tx| discovery::upsert_device(tx, &device))
            .map_err(DomainError::from)?;
        self.audit.write(
            AuditEventParams {
                tenant_id,
                actor_user_id: Some(auth.user_id),
                action: "discovery.probe".to_string(),
                target_type: Some("discovered_device".to_string()),
                target_id: Some(device_id.to_string()),
                result,
                reason_code,
                request_id: auth.request_id.clone(),
                client_ip: auth.client_ip.clone(),
                user_agent: auth.user_agent.clone(),
                metadata: serde_json::json!({}),
            },
            now,
        );
        Ok(device)
    }
}
