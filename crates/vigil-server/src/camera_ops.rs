// crates/vigil-server/src/camera_ops.rs
// ============================================================================
// Module: Camera Operations
// Description: Inventory lifecycle: CRUD, bulk creates, credentials,
//              profiles, stream selection, groups, RTSP validation.
// Purpose: Apply license gating, credential hygiene, and auditing to every
//          camera write.
// Dependencies: vigil-core, vigil-devices, vigil-store
// ============================================================================

//! ## Overview
//! Camera creates consume license capacity and are gated per item, also in
//! bulk calls (at most 100 per call, each item gated and reported
//! individually). Media profiles pass through credential stripping before
//! persistence, so the no-userinfo invariant holds at the storage boundary
//! as well as at probe time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use vigil_core::AuditEventParams;
use vigil_core::AuditResult;
use vigil_core::Camera;
use vigil_core::CameraGroup;
use vigil_core::CameraId;
use vigil_core::CredentialOwner;
use vigil_core::DomainError;
use vigil_core::GroupId;
use vigil_core::MediaProfile;
use vigil_core::NewCamera;
use vigil_core::PlainCredential;
use vigil_core::SiteId;
use vigil_core::StreamSelection;
use vigil_devices::rtsp;
use vigil_devices::strip_credentials;
use vigil_store::CameraFilter;
use vigil_store::CameraUpdate;
use vigil_store::PostgresStore;
use vigil_store::cameras;

use crate::audit::AuditService;
use crate::auth::AuthContext;
use crate::license::LicenseManager;
use crate::vault::CredentialVault;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum cameras accepted in one bulk create.
pub const BULK_CREATE_CAP: usize = 100;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Camera operations service.
pub struct CameraOps {
    /// Relational store.
    store: Arc<PostgresStore>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// License gate.
    license: Arc<LicenseManager>,
    /// Audit pipeline.
    audit: Arc<AuditService>,
}

/// Outcome of one bulk-create item.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkItemOutcome {
    /// The camera was created.
    Created {
        /// New camera id.
        camera_id: CameraId,
    },
    /// The item was rejected.
    Rejected {
        /// Stable reason code.
        reason_code: String,
    },
}

impl CameraOps {
    /// Builds the service.
    #[must_use]
    pub fn new(
        store: Arc<PostgresStore>,
        vault: Arc<CredentialVault>,
        license: Arc<LicenseManager>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            vault,
            license,
            audit,
        }
    }

    /// Creates a camera, gated by the license.
    ///
    /// # Errors
    ///
    /// Returns validation, license, conflict, or dependency failures.
    pub fn create_camera(
        &self,
        auth: &AuthContext,
        new: &NewCamera,
        now: OffsetDateTime,
    ) -> Result<Camera, DomainError> {
        if new.port == 0 {
            return Err(DomainError::validation("port", "port must be 1-65535"));
        }
        if new.display_name.trim().is_empty() {
            return Err(DomainError::validation("display_name", "display name required"));
        }
        let tenant_id = auth.tenant_id;
        if let Err(denied) = self.license.check("camera.create", tenant_id) {
            self.audit_write(auth, "camera.create", None, AuditResult::Failure, Some(denied.reason_code), now);
            return Err(denied);
        }
        let created = self
            .store
            .with_tenant(tenant_id, |tx| cameras::create_camera(tx, tenant_id, new, now))
            .map_err(DomainError::from);
        match created {
            Ok(camera) => {
                self.audit_write(auth, "camera.create", Some(camera.id), AuditResult::Success, None, now);
                Ok(camera)
            }
            Err(err) => {
                self.audit_write(auth, "camera.create", None, AuditResult::Failure, Some(err.reason_code), now);
                Err(err)
            }
        }
    }

    /// Creates up to [`BULK_CREATE_CAP`] cameras, each individually gated.
    ///
    /// # Errors
    ///
    /// Returns a validation failure when the batch exceeds the cap.
    pub fn bulk_create(
        &self,
        auth: &AuthContext,
        items: &[NewCamera],
        now: OffsetDateTime,
    ) -> Result<Vec<BulkItemOutcome>, DomainError> {
        if items.len() > BULK_CREATE_CAP {
            return Err(DomainError::validation(
                "cameras",
                format!("bulk create accepts at most {BULK_CREATE_CAP} items"),
            ));
        }
        Ok(items
            .iter()
            .map(|item| match self.create_camera(auth, item, now) {
                Ok(camera) => BulkItemOutcome::Created {
                    camera_id: camera.id,
                },
                Err(err) => BulkItemOutcome::Rejected {
                    reason_code: err.reason_code.to_string(),
                },
            })
            .collect())
    }

    /// Lists cameras with the given filter.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down.
    pub fn list_cameras(
        &self,
        auth: &AuthContext,
        filter: &CameraFilter,
    ) -> Result<Vec<Camera>, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| cameras::list_cameras(tx, filter))
            .map_err(DomainError::from)
    }

    /// Loads one camera; cross-tenant reads surface as not-found.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn get_camera(&self, auth: &AuthContext, camera_id: CameraId) -> Result<Camera, DomainError> {
        self.store
            .with_tenant(auth.tenant_id, |tx| cameras::get_camera(tx, camera_id))
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("camera_missing"))
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn update_camera(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
        update: &CameraUpdate,
        now: OffsetDateTime,
    ) -> Result<Camera, DomainError> {
        let updated = self
            .store
            .with_tenant(auth.tenant_id, |tx| cameras::update_camera(tx, camera_id, update, now))
            .map_err(DomainError::from)?;
        self.audit_write(auth, "camera.update", Some(camera_id), AuditResult::Success, None, now);
        Ok(updated)
    }

    /// Soft-deletes a camera and its credential.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn delete_camera(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        let deleted = self
            .store
            .with_tenant(auth.tenant_id, |tx| cameras::soft_delete_camera(tx, camera_id, now))
            .map_err(DomainError::from)?;
        if !deleted {
            return Err(DomainError::not_found("camera_missing"));
        }
        let _ = self.vault.delete_credential(auth.tenant_id, CredentialOwner::Camera(camera_id));
        self.audit_write(auth, "camera.delete", Some(camera_id), AuditResult::Success, None, now);
        Ok(())
    }

    /// Enables or disables a camera.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn set_enabled(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
        enabled: bool,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        let updated = self
            .store
            .with_tenant(auth.tenant_id, |tx| {
                cameras::set_camera_enabled(tx, camera_id, enabled, now)
            })
            .map_err(DomainError::from)?;
        if !updated {
            return Err(DomainError::not_found("camera_missing"));
        }
        let action = if enabled { "camera.enable" } else { "camera.disable" };
        self.audit_write(auth, action, Some(camera_id), AuditResult::Success, None, now);
        Ok(())
    }

    /// Stores the device credential for a camera.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn set_credential(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
        credential: &PlainCredential,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        // Existence check keeps credential rows from outliving inventory.
        self.get_camera(auth, camera_id)?;
        self.vault.store_credential(
            auth.tenant_id,
            CredentialOwner::Camera(camera_id),
            credential,
            now,
        )?;
        self.audit_write(auth, "camera.credential", Some(camera_id), AuditResult::Success, None, now);
        Ok(())
    }

    /// Replaces a camera's media profiles, stripping credentials from every
    /// RTSP URL first.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn replace_profiles(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
        profiles: &[MediaProfile],
    ) -> Result<(), DomainError> {
        self.get_camera(auth, camera_id)?;
        let stripped: Vec<MediaProfile> = profiles
            .iter()
            .map(|profile| {
                let mut profile = profile.clone();
                profile.camera_id = camera_id;
                profile.rtsp_url = strip_credentials(&profile.rtsp_url);
                profile
            })
            .collect();
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| {
                cameras::replace_media_profiles(tx, tenant_id, camera_id, &stripped)
            })
            .map_err(DomainError::from)
    }

    /// Lists a camera's media profiles.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn list_profiles(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
    ) -> Result<Vec<MediaProfile>, DomainError> {
        self.get_camera(auth, camera_id)?;
        self.store
            .with_tenant(auth.tenant_id, |tx| cameras::list_media_profiles(tx, camera_id))
            .map_err(DomainError::from)
    }

    /// Upserts a camera's stream selection; the version only moves forward.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras.
    pub fn set_stream_selection(
        &self,
        auth: &AuthContext,
        selection: &StreamSelection,
    ) -> Result<StreamSelection, DomainError> {
        self.get_camera(auth, selection.camera_id)?;
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| cameras::upsert_stream_selection(tx, tenant_id, selection))
            .map_err(DomainError::from)
    }

    /// Probes a camera's selected RTSP stream on demand.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown cameras and protocol failures for
    /// unprobeable URLs.
    pub async fn validate_rtsp(
        &self,
        auth: &AuthContext,
        camera_id: CameraId,
    ) -> Result<rtsp::RtspProbeOutcome, DomainError> {
        let camera = self.get_camera(auth, camera_id)?;
        let tenant_id = auth.tenant_id;
        let url = self
            .store
            .with_tenant(tenant_id, |tx| {
                let Some(selection) = cameras::get_stream_selection(tx, camera_id)? else {
                    return Ok(None);
                };
                let profiles = cameras::list_media_profiles(tx, camera_id)?;
                Ok(profiles
                    .into_iter()
                    .find(|profile| profile.token == selection.main_token)
                    .map(|profile| profile.rtsp_url))
            })
            .map_err(DomainError::from)?
            .unwrap_or_else(|| format!("rtsp://{}:{}/", camera.ip, camera.port));
        let credential =
            self.vault.fetch_credential(tenant_id, CredentialOwner::Camera(camera_id)).ok();
        tokio::task::spawn_blocking(move || {
            rtsp::probe(&url, credential.as_ref(), rtsp::RTSP_PROBE_TIMEOUT)
        })
        .await
        .map_err(|_| DomainError::internal("probe task failed"))?
        .map_err(|err| DomainError::new(err.kind(), err.coarse_code(), err.to_string()))
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Creates a camera group.
    ///
    /// # Errors
    ///
    /// Returns conflict for duplicate names.
    pub fn create_group(
        &self,
        auth: &AuthContext,
        site_id: Option<SiteId>,
        name: &str,
    ) -> Result<CameraGroup, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "group name required"));
        }
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| cameras::create_group(tx, tenant_id, site_id, name))
            .map_err(DomainError::from)
    }

    /// Lists the tenant's groups.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down.
    pub fn list_groups(&self, auth: &AuthContext) -> Result<Vec<CameraGroup>, DomainError> {
        self.store.with_tenant(auth.tenant_id, cameras::list_groups).map_err(DomainError::from)
    }

    /// Deletes a group.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown groups.
    pub fn delete_group(&self, auth: &AuthContext, group_id: GroupId) -> Result<(), DomainError> {
        let deleted = self
            .store
            .with_tenant(auth.tenant_id, |tx| cameras::delete_group(tx, group_id))
            .map_err(DomainError::from)?;
        if !deleted {
            return Err(DomainError::not_found("group_missing"));
        }
        Ok(())
    }

    /// Replaces a group's membership.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown groups.
    pub fn replace_group_members(
        &self,
        auth: &AuthContext,
        group_id: GroupId,
        camera_ids: &[CameraId],
    ) -> Result<(), DomainError> {
        let tenant_id = auth.tenant_id;
        self.store
            .with_tenant(tenant_id, |tx| {
                cameras::replace_group_members(tx, tenant_id, group_id, camera_ids)
            })
            .map_err(DomainError::from)
    }

    /// Emits an audit event for a camera action.
    fn audit_write(
        &self,
        auth: &AuthContext,
        action: &str,
        camera_id: Option<CameraId>,
        result: AuditResult,
        reason_code: Option<&str>,
        now: OffsetDateTime,
    ) {
        self.audit.write(
            AuditEventParams {
                tenant_id: auth.tenant_id,
                actor_user_id: Some(auth.user_id),
                action: action.to_string(),
                target_type: Some("camera".to_string()),
                target_id: camera_id.map(|id| id.to_string()),
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
