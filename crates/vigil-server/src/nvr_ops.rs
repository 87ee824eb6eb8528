// crates/vigil-server/src/nvr_ops.rs
// ============================================================================
// Module: NVR Operations
// Description: Recorder lifecycle: CRUD, connection tests, channel
//              discovery, validation, and camera provisioning.
// Purpose: Drive vendor adapters from the API surface with license gating.
// Dependencies: vigil-core, vigil-devices, vigil-store
// ============================================================================

//! ## Overview
//! NVR writes are license-gated (`nvr.create` consumes capacity) and every
//! state-changing call emits an audit event. Channel discovery upserts the
//! vendor listing by stable reference; provisioning turns unprovisioned
//! channels into cameras (each create individually license-gated) and links
//! them back to their channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use vigil_core::AuditEventParams;
use vigil_core::AuditResult;
use vigil_core::CameraNvrLink;
use vigil_core::ChannelValidation;
use vigil_core::CredentialOwner;
use vigil_core::DomainError;
use vigil_core::NewCamera;
use vigil_core::Nvr;
use vigil_core::NvrChannel;
use vigil_core::NvrId;
use vigil_core::NvrStatus;
use vigil_core::PlainCredential;
use vigil_core::ProvisioningState;
use vigil_core::RecordingMode;
use vigil_devices::AdapterRegistry;
use vigil_devices::DeviceError;
use vigil_devices::NvrEndpoint;
use vigil_store::NewNvr;
use vigil_store::PostgresStore;
use vigil_store::cameras;
use vigil_store::nvrs;

use crate::audit::AuditService;
use crate::auth::AuthContext;
use crate::license::LicenseManager;
use crate::vault::CredentialVault;

// ============================================================================
// SECTION: Service
// ============================================================================

/// NVR operations service.
pub struct NvrOps {
    /// Relational store.
    store: Arc<PostgresStore>,
    /// Vendor adapter registry.
    registry: Arc<AdapterRegistry>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// License gate.
    license: Arc<LicenseManager>,
    /// Audit pipeline.
    audit: Arc<AuditService>,
}

impl NvrOps {
    /// Builds the service.
    #[must_use]
    pub fn new(
        store: Arc<PostgresStore>,
        registry: Arc<AdapterRegistry>,
        vault: Arc<CredentialVault>,
        license: Arc<LicenseManager>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            registry,
            vault,
            license,
            audit,
        }
    }

    /// Creates an NVR with its credential, gated by the license.
    ///
    /// # Errors
    ///
    /// Returns license, conflict, or dependency failures.
    pub fn create_nvr(
        &self,
        auth: &AuthContext,
        new: &NewNvr,
        credential: &PlainCredential,
        now: OffsetDateTime,
    ) -> Result<Nvr, DomainError> {
        let tenant_id = auth.tenant_id;
        let gate = self.license.check("nvr.create", tenant_id);
        if let Err(denied) = gate {
            self.audit_write(auth, "nvr.create", None, AuditResult::Failure, Some(denied.reason_code), now);
            return Err(denied);
        }
        let created = self
            .store
            .with_tenant(tenant_id, |tx| nvrs::create_nvr(tx, tenant_id, new, now))
            .map_err(DomainError::from);
        let nvr = match created {
            Ok(nvr) => nvr,
            Err(err) => {
                self.audit_write(auth, "nvr.create", None, AuditResult::Failure, Some(err.reason_code), now);
                return Err(err);
            }
        };
        self.vault.store_credential(tenant_id, CredentialOwner::Nvr(nvr.id), credential, now)?;
        self.audit_write(auth, "nvr.create", Some(nvr.id), AuditResult::Success, None, now);
        Ok(nvr)
    }

    /// Lists the tenant's NVRs.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down.
    pub fn list_nvrs(&self, auth: &AuthContext) -> Result<Vec<Nvr>, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| nvrs::list_nvrs(tx, false))
            .map_err(DomainError::from)
    }

    /// Loads one NVR.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown or cross-tenant NVRs.
    pub fn get_nvr(&self, auth: &AuthContext, nvr_id: NvrId) -> Result<Nvr, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| nvrs::get_nvr(tx, nvr_id))
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("nvr_missing"))
    }

    /// Soft-deletes an NVR and its credential.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown NVRs.
    pub fn delete_nvr(
        &self,
        auth: &AuthContext,
        nvr_id: NvrId,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        let deleted = self
            .store
            .with_tenant(auth.tenant_id, |tx| nvrs::soft_delete_nvr(tx, nvr_id, now))
            .map_err(DomainError::from)?;
        if !deleted {
            return Err(DomainError::not_found("nvr_missing"));
        }
        let _ = self.vault.delete_credential(auth.tenant_id, CredentialOwner::Nvr(nvr_id));
        self.audit_write(auth, "nvr.delete", Some(nvr_id), AuditResult::Success, None, now);
        Ok(())
    }

    /// Tests reachability and credentials, persisting the observed status.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown NVRs and dependency failures from the
    /// store; the device outcome itself is returned as the status.
    pub async fn test_connection(
        &self,
        auth: &AuthContext,
        nvr_id: NvrId,
        now: OffsetDateTime,
    ) -> Result<NvrStatus, DomainError> {
        let nvr = self.get_nvr(auth, nvr_id)?;
        let adapter = self
            .registry
            .resolve(nvr.vendor)
            .ok_or_else(|| DomainError::internal("adapter missing"))?;
        let credential =
            self.vault.fetch_credential(auth.tenant_id, CredentialOwner::Nvr(nvr_id))?;
        let endpoint = NvrEndpoint {
            host: nvr.ip.to_string(),
            port: nvr.port,
            https: false,
        };
        let result = tokio::task::spawn_blocking(move || {
            adapter.test_connection(&endpoint, &credential)
        })
        .await
        .map_err(|_| DomainError::internal("probe task failed"))?;
        let status = match result {
            Ok(()) => NvrStatus::Online,
            Err(DeviceError::Unauthorized) => NvrStatus::AuthFailed,
            Err(DeviceError::Timeout(_) | DeviceError::Io(_)) => NvrStatus::Offline,
            Err(_) => NvrStatus::Error,
        };
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| nvrs::set_nvr_status(tx, nvr_id, status, now))
            .map_err(DomainError::from)?;
        Ok(status)
    }

    /// Discovers channels from the device and upserts them.
    ///
    /// # Errors
    ///
    /// Returns classified device failures or store failures.
    pub async fn discover_channels(
        &self,
        auth: &AuthContext,
        nvr_id: NvrId,
    ) -> Result<Vec<NvrChannel>, DomainError> {
        let nvr = self.get_nvr(auth, nvr_id)?;
        let adapter = self
            .registry
            .resolve(nvr.vendor)
            .ok_or_else(|| DomainError::internal("adapter missing"))?;
        let credential =
            self.vault.fetch_credential(auth.tenant_id, CredentialOwner::Nvr(nvr_id))?;
        let endpoint = NvrEndpoint {
            host: nvr.ip.to_string(),
            port: nvr.port,
            https: false,
        };
        let listed = tokio::task::spawn_blocking(move || {
            adapter.list_channels(&endpoint, &credential)
        })
        .await
        .map_err(|_| DomainError::internal("probe task failed"))?
        .map_err(device_error)?;

        let pairs: Vec<(String, String)> = listed
            .into_iter()
            .map(|channel| (channel.channel_ref, channel.name))
            .collect();
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| nvrs::upsert_channels(tx, tenant_id, nvr_id, &pairs))
            .map_err(DomainError::from)
    }

    /// Validates channels; only runs when the recorder is reachable.
    ///
    /// # Errors
    ///
    /// Returns classified device failures or store failures.
    pub async fn validate_channels(
        &self,
        auth: &AuthContext,
        nvr_id: NvrId,
        now: OffsetDateTime,
    ) -> Result<Vec<NvrChannel>, DomainError> {
        let status = self.test_connection(auth, nvr_id, now).await?;
        let tenant_id = auth.tenant_id;
        let validation = match status {
            NvrStatus::Online => ChannelValidation::Ok,
            NvrStatus::AuthFailed => ChannelValidation::Unauthorized,
            NvrStatus::Offline => ChannelValidation::Timeout,
            NvrStatus::Error | NvrStatus::Unknown => ChannelValidation::Error,
        };
        self.store
            .with_tenant(tenant_id, |tx| {
                let channels = nvrs::list_channels(tx, nvr_id)?;
                for channel in &channels {
                    nvrs::set_channel_validation(tx, channel.id, validation)?;
                }
                nvrs::list_channels(tx, nvr_id)
            })
            .map_err(DomainError::from)
    }

    /// Provisions cameras for unprovisioned channels. Each camera create is
    /// individually license-gated; the call reports how many landed.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown NVRs and dependency failures from the
    /// store.
    pub fn provision_cameras(
        &self,
        auth: &AuthContext,
        nvr_id: NvrId,
        now: OffsetDateTime,
    ) -> Result<ProvisionReport, DomainError> {
        let nvr = self.get_nvr(auth, nvr_id)?;
        let tenant_id = auth.tenant_id;
        let channels = self
            .store
            .with_tenant(tenant_id, |tx| nvrs::list_channels(tx, nvr_id))
            .map_err(DomainError::from)?;

        let mut report = ProvisionReport::default();
        for channel in channels {
            if channel.provisioning == ProvisioningState::Created {
                report.skipped += 1;
                continue;
            }
            if let Err(denied) = self.license.check("camera.create", tenant_id) {
                report.denied += 1;
                report.last_denial = Some(denied.reason_code.to_string());
                continue;
            }
            let port_offset: u16 = channel.channel_ref.parse().unwrap_or(0);
            let new_camera = NewCamera {
                site_id: nvr.site_id,
                display_name: if channel.name.is_empty() {
                    format!("{} ch {}", nvr.display_name, channel.channel_ref)
                } else {
                    channel.name.clone()
                },
                ip: nvr.ip,
                // Proxy channels share the recorder address; the channel
                // reference keeps endpoints unique.
                port: 10_000_u16.saturating_add(port_offset),
                manufacturer: None,
                model: None,
                serial: None,
                mac: None,
                tags: std::collections::BTreeSet::new(),
            };
            let provisioned = self.store.with_tenant(tenant_id, |tx| {
                let camera = cameras::create_camera(tx, tenant_id, &new_camera, now)?;
                nvrs::mark_channel_provisioned(tx, channel.id, camera.id)?;
                nvrs::upsert_camera_link(
                    tx,
                    tenant_id,
                    &CameraNvrLink {
                        camera_id: camera.id,
                        nvr_id,
                        channel_ref: channel.channel_ref.clone(),
                        recording_mode: RecordingMode::Nvr,
                    },
                )?;
                Ok(camera)
            });
            match provisioned {
                Ok(_) => report.created += 1,
                Err(_) => report.failed += 1,
            }
        }
        self.audit_write(auth, "nvr.provision", Some(nvr_id), AuditResult::Success, None, now);
        Ok(report)
    }

    /// Emits an audit event for an NVR action.
    fn audit_write(
        &self,
        auth: &AuthContext,
        action: &str,
        nvr_id: Option<NvrId>,
        result: AuditResult,
        reason_code: Option<&str>,
        now: OffsetDateTime,
    ) {
        self.audit.write(
            AuditEventParams {
                tenant_id: auth.tenant_id,
                actor_user_id: Some(auth.user_id),
                action: action.to_string(),
                target_type: Some("nvr".to_string()),
                target_id: nvr_id.map(|id| id.to_string()),
                result,
                reason_code: reason_code.map(str::to_string),
                request_id: auth.request_id.clone(),
                client_ip: auth.client_ip.clone(),
                user_agent: auth.user_agent.clone(),
                metadata: serde_json::json!({}),
            },
            now,
        );
    }
}

/// Classifies a device failure into the closed taxonomy.
fn device_error(err: DeviceError) -> DomainError {
    DomainError::new(err.kind(), err.coarse_code(), err.to_string())
}

/// Outcome of a provisioning call.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProvisionReport {
    /// Cameras created.
    pub created: u32,
    /// Channels already provisioned.
    pub skipped: u32,
    /// Creates denied by the license gate.
    pub denied: u32,
    /// Creates that failed in the store.
    pub failed: u32,
    /// Reason code of the last license denial.
    pub last_denial: Option<String>,
}
