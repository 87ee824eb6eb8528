// crates/vigil-crypto/src/envelope.rs
// ============================================================================
// Module: Envelope Encryption
// Description: AES-256-GCM per-record DEK generation, wrap, and unwrap.
// Purpose: Encrypt credential payloads bound to their owner via AAD.
// Dependencies: aes-gcm, rand, serde
// ============================================================================

//! ## Overview
//! Each record gets a fresh 256-bit data-encryption key. The plaintext is
//! AES-GCM-encrypted under the DEK with a random 96-bit nonce and the
//! caller's AAD; the DEK is then wrapped under the active master key with the
//! same AAD. Decrypting requires reconstructing the identical AAD; any
//! mismatch fails verification and surfaces as data corruption.
//!
//! ## Invariants
//! - Nonces are never reused: both are drawn fresh per seal.
//! - The persisted record carries everything needed to decrypt except the
//!   master key: key id, both nonces, both ciphertexts, both tags.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::Payload;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::keyring::Keyring;
use crate::keyring::KeyringError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Data-encryption key length in bytes.
pub const DEK_LEN: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope sealing and opening failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Key lookup failed.
    #[error(transparent)]
    Keyring(#[from] KeyringError),
    /// The stored record has malformed lengths.
    #[error("envelope record malformed: {0}")]
    Malformed(&'static str),
    /// GCM verification failed: wrong key, tampered data, or AAD mismatch.
    #[error("envelope integrity check failed")]
    Integrity,
}

// ============================================================================
// SECTION: Record
// ============================================================================

/// A sealed envelope as persisted alongside its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    /// Master key the DEK is wrapped under.
    pub master_key_id: String,
    /// Nonce used to wrap the DEK.
    pub dek_nonce: Vec<u8>,
    /// Wrapped DEK ciphertext.
    pub dek_ciphertext: Vec<u8>,
    /// Wrapped DEK authentication tag.
    pub dek_tag: Vec<u8>,
    /// Nonce used to encrypt the payload.
    pub payload_nonce: Vec<u8>,
    /// Payload ciphertext.
    pub payload_ciphertext: Vec<u8>,
    /// Payload authentication tag.
    pub payload_tag: Vec<u8>,
}

// ============================================================================
// SECTION: Seal / Open
// ============================================================================

/// Seals a plaintext under a fresh DEK wrapped by the active master key.
///
/// # Errors
///
/// Returns [`EnvelopeError`] when the active key is unavailable or
/// encryption fails.
pub fn seal(keyring: &Keyring, aad: &[u8], plaintext: &[u8]) -> Result<EnvelopeRecord, EnvelopeError> {
    let mut dek = [0_u8; DEK_LEN];
    rand::thread_rng().fill_bytes(&mut dek);

    let (payload_nonce, payload_ciphertext, payload_tag) = encrypt_detached(&dek, aad, plaintext)?;
    let master_key = keyring.key(keyring.active_key_id())?;
    let (dek_nonce, dek_ciphertext, dek_tag) = encrypt_detached(master_key, aad, &dek)?;

    Ok(EnvelopeRecord {
        master_key_id: keyring.active_key_id().to_string(),
        dek_nonce,
        dek_ciphertext,
        dek_tag,
        payload_nonce,
        payload_ciphertext,
        payload_tag,
    })
}

/// Opens a sealed envelope, requiring the identical AAD used to seal it.
///
/// # Errors
///
/// Returns [`EnvelopeError::Integrity`] on any verification failure,
/// including an AAD mismatch.
pub fn open(keyring: &Keyring, aad: &[u8], record: &EnvelopeRecord) -> Result<Vec<u8>, EnvelopeError> {
    let master_key = keyring.key(&record.master_key_id)?;
    let dek_bytes = decrypt_detached(
        master_key,
        aad,
        &record.dek_nonce,
        &record.dek_ciphertext,
        &record.dek_tag,
    )?;
    let dek: [u8; DEK_LEN] =
        dek_bytes.try_into().map_err(|_| EnvelopeError::Malformed("dek length"))?;
    decrypt_detached(
        &dek,
        aad,
        &record.payload_nonce,
        &record.payload_ciphertext,
        &record.payload_tag,
    )
}

/// Re-wraps a record's DEK under the active master key without touching the
/// payload ciphertext. Used by background re-encryption after rotation.
///
/// # Errors
///
/// Returns [`EnvelopeError`] when either key is unavailable or the wrap
/// fails verification.
pub fn rewrap(
    keyring: &Keyring,
    aad: &[u8],
    record: &EnvelopeRecord,
) -> Result<EnvelopeRecord, EnvelopeError> {
    let old_key = keyring.key(&record.master_key_id)?;
    let dek = decrypt_detached(
        old_key,
        aad,
        &record.dek_nonce,
        &record.dek_ciphertext,
        &record.dek_tag,
    )?;
    let active_key = keyring.key(keyring.active_key_id())?;
    let (dek_nonce, dek_ciphertext, dek_tag) = encrypt_detached(active_key, aad, &dek)?;
    Ok(EnvelopeRecord {
        master_key_id: keyring.active_key_id().to_string(),
        dek_nonce,
        dek_ciphertext,
        dek_tag,
        payload_nonce: record.payload_nonce.clone(),
        payload_ciphertext: record.payload_ciphertext.clone(),
        payload_tag: record.payload_tag.clone(),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Encrypts with a fresh nonce, returning `(nonce, ciphertext, tag)`.
fn encrypt_detached(
    key: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), EnvelopeError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let mut combined = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EnvelopeError::Integrity)?;
    if combined.len() < TAG_LEN {
        return Err(EnvelopeError::Malformed("ciphertext shorter than tag"));
    }
    let tag = combined.split_off(combined.len() - TAG_LEN);
    Ok((nonce.to_vec(), combined, tag))
}

/// Decrypts a detached `(nonce, ciphertext, tag)` triple.
fn decrypt_detached(
    key: &[u8],
    aad: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    if nonce.len() != NONCE_LEN {
        return Err(EnvelopeError::Malformed("nonce length"));
    }
    if tag.len() != TAG_LEN {
        return Err(EnvelopeError::Malformed("tag length"));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| EnvelopeError::Integrity)
}
