// crates/vigil-crypto/src/keyring.rs
// ============================================================================
// Module: Master Keyring
// Description: Environment-loaded master keys and AAD construction.
// Purpose: Hold wrap keys by stable id and bind ciphertexts to their context.
// Dependencies: base64, serde
// ============================================================================

//! ## Overview
//! The keyring loads one or more 256-bit master keys from the process
//! environment, each identified by a stable key id. Rotation changes the
//! active id without destroying prior keys, so records written under older
//! keys remain readable until re-encrypted.
//!
//! ## Invariants
//! - Every loaded key is exactly 32 bytes.
//! - The active key id always resolves to a loaded key.
//! - AAD strings are pure functions of `(tenant, purpose, owner)`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use uuid::Uuid;

use vigil_core::TenantId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Keyring construction and lookup failures.
#[derive(Debug, Clone, Error)]
pub enum KeyringError {
    /// The key list variable was missing or empty.
    #[error("no master keys configured")]
    NoKeys,
    /// A key entry failed to parse as `<id>:<base64>`.
    #[error("malformed master key entry: {0}")]
    MalformedEntry(String),
    /// A key decoded to the wrong length.
    #[error("master key {0} is not 32 bytes")]
    WrongLength(String),
    /// The configured active key id is not among the loaded keys.
    #[error("active master key {0} not found")]
    ActiveKeyMissing(String),
    /// A record references a key id the keyring no longer holds.
    #[error("unknown master key id: {0}")]
    UnknownKeyId(String),
}

// ============================================================================
// SECTION: Keyring
// ============================================================================

/// Length of every master key in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// A set of master keys with one active wrap key.
pub struct Keyring {
    /// Loaded keys by stable id.
    keys: BTreeMap<String, [u8; MASTER_KEY_LEN]>,
    /// Id of the key used for new wraps.
    active_key_id: String,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs through Debug formatting.
        f.debug_struct("Keyring")
            .field("key_ids", &self.keys.keys().collect::<Vec<_>>())
            .field("active_key_id", &self.active_key_id)
            .finish()
    }
}

impl Keyring {
    /// Parses a keyring from the `<id>:<base64>` comma list and active id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError`] when parsing fails or the active id is
    /// missing from the list.
    pub fn from_spec(keys_spec: &str, active_key_id: &str) -> Result<Self, KeyringError> {
        let mut keys = BTreeMap::new();
        for entry in keys_spec.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let Some((id, encoded)) = entry.split_once(':') else {
                return Err(KeyringError::MalformedEntry(entry.to_string()));
            };
            let decoded = BASE64
                .decode(encoded.trim())
                .map_err(|_| KeyringError::MalformedEntry(id.to_string()))?;
            let key: [u8; MASTER_KEY_LEN] =
                decoded.try_into().map_err(|_| KeyringError::WrongLength(id.to_string()))?;
            keys.insert(id.trim().to_string(), key);
        }
        if keys.is_empty() {
            return Err(KeyringError::NoKeys);
        }
        if !keys.contains_key(active_key_id) {
            return Err(KeyringError::ActiveKeyMissing(active_key_id.to_string()));
        }
        Ok(Self {
            keys,
            active_key_id: active_key_id.to_string(),
        })
    }

    /// Returns the id of the active wrap key.
    #[must_use]
    pub fn active_key_id(&self) -> &str {
        &self.active_key_id
    }

    /// Returns the ids of all loaded keys.
    #[must_use]
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Looks up key material by id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::UnknownKeyId`] for ids the keyring lacks.
    pub(crate) fn key(&self, key_id: &str) -> Result<&[u8; MASTER_KEY_LEN], KeyringError> {
        self.keys.get(key_id).ok_or_else(|| KeyringError::UnknownKeyId(key_id.to_string()))
    }
}

// ============================================================================
// SECTION: AAD Construction
// ============================================================================

/// Builds the AAD bytes binding a ciphertext to a tenant and purpose.
#[must_use]
pub fn aad_for(tenant_id: TenantId, purpose: &str, owner: Option<Uuid>) -> Vec<u8> {
    let mut aad = format!("tenant:{}:purpose:{purpose}", tenant_id.as_uuid());
    if let Some(owner) = owner {
        aad.push_str(":owner:");
        aad.push_str(&owner.to_string());
    }
    aad.into_bytes()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    fn encoded_key(byte: u8) -> String {
        BASE64.encode([byte; MASTER_KEY_LEN])
    }

    #[test]
    fn parses_multiple_keys_and_active() {
        let spec = format!("k1:{},k2:{}", encoded_key(1), encoded_key(2));
        let keyring = Keyring::from_spec(&spec, "k2").unwrap();
        assert_eq!(keyring.active_key_id(), "k2");
        assert_eq!(keyring.key_ids(), vec!["k1", "k2"]);
    }

    #[test]
    fn rejects_active_id_not_in_list() {
        let spec = format!("k1:{}", encoded_key(1));
        let err = Keyring::from_spec(&spec, "k9").unwrap_err();
        assert!(matches!(err, KeyringError::ActiveKeyMissing(_)));
    }

    #[test]
    fn rejects_short_key() {
        let spec = format!("k1:{}", BASE64.encode([7_u8; 16]));
        let err = Keyring::from_spec(&spec, "k1").unwrap_err();
        assert!(matches!(err, KeyringError::WrongLength(_)));
    }

    #[test]
    fn aad_includes_owner_when_present() {
        let tenant = TenantId::generate();
        let owner = Uuid::new_v4();
        let with_owner = aad_for(tenant, "device_credential", Some(owner));
        let without = aad_for(tenant, "device_credential", None);
        assert_ne!(with_owner, without);
        let rendered = String::from_utf8(with_owner).unwrap();
        assert!(rendered.starts_with(&format!("tenant:{}", tenant.as_uuid())));
        assert!(rendered.ends_with(&format!("owner:{owner}")));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let spec = format!("k1:{}", encoded_key(9));
        let keyring = Keyring::from_spec(&spec, "k1").unwrap();
        let rendered = format!("{keyring:?}");
        assert!(!rendered.contains(&encoded_key(9)));
    }
}
