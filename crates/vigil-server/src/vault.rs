// crates/vigil-server/src/vault.rs
// ============================================================================
// Module: Credential Vault
// Description: Sealed device-credential storage bound to owners via AAD.
// Purpose: Be the only path between plaintext device credentials and the
//          store.
// Dependencies: vigil-core, vigil-crypto, vigil-store
// ============================================================================

//! ## Overview
//! The vault seals `{username, password}` payloads under a fresh DEK with
//! an AAD binding the ciphertext to its tenant, purpose, and owner, and
//! opens them with the identical AAD. An AAD mismatch is data corruption,
//! never a retry. Normal operations only read; writes go through the
//! service methods here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use vigil_core::CredentialOwner;
use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::PlainCredential;
use vigil_core::TenantId;
use vigil_crypto::Keyring;
use vigil_crypto::aad_for;
use vigil_crypto::open;
use vigil_crypto::seal;
use vigil_store::PostgresStore;
use vigil_store::credentials;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// AAD purpose slug for device credentials.
const PURPOSE_DEVICE: &str = "device_credential";

// ============================================================================
// SECTION: Service
// ============================================================================

/// The credential vault.
pub struct CredentialVault {
    /// Master keyring.
    keyring: Arc<Keyring>,
    /// Relational store.
    store: Arc<PostgresStore>,
}

impl CredentialVault {
    /// Builds the vault.
    #[must_use]
    pub fn new(keyring: Arc<Keyring>, store: Arc<PostgresStore>) -> Self {
        Self {
            keyring,
            store,
        }
    }

    /// Seals and stores a credential for an owner.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down and an internal
    /// failure when sealing fails.
    pub fn store_credential(
        &self,
        tenant_id: TenantId,
        owner: CredentialOwner,
        credential: &PlainCredential,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_vec(credential)
            .map_err(|err| DomainError::internal(err.to_string()))?;
        let aad = aad_for(tenant_id, PURPOSE_DEVICE, Some(owner.owner_uuid()));
        let envelope = seal(&self.keyring, &aad, &payload)
            .map_err(|err| DomainError::internal(err.to_string()))?;
        self.store
            .with_tenant(tenant_id, |tx| {
                credentials::upsert_credential(tx, tenant_id, owner, &envelope, now)
            })
            .map_err(DomainError::from)?;
        Ok(())
    }

    /// Opens the credential for an owner.
    ///
    /// # Errors
    ///
    /// Returns not-found when no credential exists and data corruption when
    /// the envelope fails verification (including AAD mismatch).
    pub fn fetch_credential(
        &self,
        tenant_id: TenantId,
        owner: CredentialOwner,
    ) -> Result<PlainCredential, DomainError> {
        let row = self
            .store
            .with_tenant(tenant_id, |tx| credentials::get_credential(tx, owner))
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::not_found("credential_missing"))?;
        let aad = aad_for(tenant_id, PURPOSE_DEVICE, Some(owner.owner_uuid()));
        let payload = open(&self.keyring, &aad, &row.envelope).map_err(|err| {
            DomainError::new(ErrorKind::DataCorruption, "envelope_integrity", err.to_string())
        })?;
        serde_json::from_slice(&payload).map_err(|err| {
            DomainError::new(ErrorKind::DataCorruption, "credential_decode", err.to_string())
        })
    }

    /// Deletes the credential for an owner.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the store is down.
    pub fn delete_credential(
        &self,
        tenant_id: TenantId,
        owner: CredentialOwner,
    ) -> Result<bool, DomainError> {
        self.store
            .with_tenant(tenant_id, |tx| credentials::delete_credential(tx, owner))
            .map_err(DomainError::from)
    }
}
