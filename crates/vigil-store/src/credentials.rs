// crates/vigil-store/src/credentials.rs
// ============================================================================
// Module: Credential Vault Repository
// Description: Encrypted credential rows, one per owner.
// Purpose: Persist sealed envelopes and rebuild them for the vault.
// Dependencies: postgres, vigil-core, vigil-crypto
// ============================================================================

//! ## Overview
//! The vault stores one sealed envelope per owner. The store never sees
//! plaintext: sealing and opening happen in the service layer against the
//! keyring, and the AAD binds each envelope to its tenant, purpose, and
//! owner so rows cannot be swapped between owners undetected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::Row;
use postgres::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use vigil_core::CredentialOwner;
use vigil_core::CredentialId;
use vigil_core::TenantId;
use vigil_crypto::EnvelopeRecord;

use crate::store::PgStoreError;

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// A persisted credential row.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    /// Credential identifier.
    pub id: CredentialId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The sealed envelope.
    pub envelope: EnvelopeRecord,
    /// When the credential was stored.
    pub created_at: OffsetDateTime,
}

/// Maps a credential row into its domain shape.
fn credential_from_row(row: &Row) -> Result<CredentialRow, PgStoreError> {
    Ok(CredentialRow {
        id: CredentialId::new(row.try_get::<_, Uuid>("id")?),
        tenant_id: TenantId::new(row.try_get::<_, Uuid>("tenant_id")?),
        envelope: EnvelopeRecord {
            master_key_id: row.try_get("master_key_id")?,
            dek_nonce: row.try_get("dek_nonce")?,
            dek_ciphertext: row.try_get("dek_ciphertext")?,
            dek_tag: row.try_get("dek_tag")?,
            payload_nonce: row.try_get("payload_nonce")?,
            payload_ciphertext: row.try_get("payload_ciphertext")?,
            payload_tag: row.try_get("payload_tag")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Upserts the sealed envelope for an owner (one credential per owner).
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn upsert_credential(
    tx: &mut Transaction<'_>,
    tenant_id: TenantId,
    owner: CredentialOwner,
    envelope: &EnvelopeRecord,
    now: OffsetDateTime,
) -> Result<CredentialId, PgStoreError> {
    let id = CredentialId::generate();
    let row = tx.query_one(
        "INSERT INTO credentials (id, tenant_id, owner_type, owner_id, master_key_id, \
         dek_nonce, dek_ciphertext, dek_tag, payload_nonce, payload_ciphertext, payload_tag, \
         created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (owner_type, owner_id) DO UPDATE SET master_key_id = $5, dek_nonce = $6, \
         dek_ciphertext = $7, dek_tag = $8, payload_nonce = $9, payload_ciphertext = $10, \
         payload_tag = $11, created_at = $12 \
         RETURNING id",
        &[
            &id.as_uuid(),
            &tenant_id.as_uuid(),
            &owner.type_label(),
            &owner.owner_uuid(),
            &envelope.master_key_id,
            &envelope.dek_nonce,
            &envelope.dek_ciphertext,
            &envelope.dek_tag,
            &envelope.payload_nonce,
            &envelope.payload_ciphertext,
            &envelope.payload_tag,
            &now,
        ],
    )?;
    Ok(CredentialId::new(row.try_get::<_, Uuid>("id")?))
}

/// Loads the sealed envelope for an owner.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn get_credential(
    tx: &mut Transaction<'_>,
    owner: CredentialOwner,
) -> Result<Option<CredentialRow>, PgStoreError> {
    let row = tx.query_opt(
        "SELECT id, tenant_id, master_key_id, dek_nonce, dek_ciphertext, dek_tag, \
         payload_nonce, payload_ciphertext, payload_tag, created_at \
         FROM credentials WHERE owner_type = $1 AND owner_id = $2",
        &[&owner.type_label(), &owner.owner_uuid()],
    )?;
    row.as_ref().map(credential_from_row).transpose()
}

/// Deletes the credential for an owner. Returns false when absent.
///
/// # Errors
///
/// Returns [`PgStoreError`] when the statement fails.
pub fn delete_credential(
    tx: &mut Transaction<'_>,
    owner: CredentialOwner,
) -> Result<bool, PgStoreError> {
    let deleted = tx.execute(
        "DELETE FROM credentials WHERE owner_type = $1 AND owner_id = $2",
        &[&owner.type_label(), &owner.owner_uuid()],
    )?;
    Ok(deleted > 0)
}
