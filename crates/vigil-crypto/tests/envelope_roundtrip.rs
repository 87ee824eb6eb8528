// crates/vigil-crypto/tests/envelope_roundtrip.rs
// ============================================================================
// Module: Envelope Round-Trip Tests
// Description: Verify seal/open laws and AAD binding.
// Purpose: Pin the envelope's integrity and rotation behavior.
// Dependencies: vigil-crypto, vigil-core
// ============================================================================

//! Envelope encryption round-trip and AAD-binding tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use uuid::Uuid;
use vigil_core::TenantId;
use vigil_crypto::EnvelopeError;
use vigil_crypto::Keyring;
use vigil_crypto::aad_for;
use vigil_crypto::open;
use vigil_crypto::rewrap;
use vigil_crypto::seal;

fn keyring_with(active: &str) -> Keyring {
    let k1 = BASE64.encode([1_u8; 32]);
    let k2 = BASE64.encode([2_u8; 32]);
    Keyring::from_spec(&format!("k1:{k1},k2:{k2}"), active).unwrap()
}

#[test]
fn seal_then_open_round_trips() {
    let keyring = keyring_with("k1");
    let aad = aad_for(TenantId::generate(), "device_credential", Some(Uuid::new_v4()));
    let record = seal(&keyring, &aad, b"admin:swordfish").unwrap();
    assert_eq!(record.master_key_id, "k1");
    assert_eq!(record.dek_nonce.len(), 12);
    assert_eq!(record.payload_tag.len(), 16);
    let plaintext = open(&keyring, &aad, &record).unwrap();
    assert_eq!(plaintext, b"admin:swordfish");
}

#[test]
fn open_with_different_aad_fails_verification() {
    let keyring = keyring_with("k1");
    let tenant = TenantId::generate();
    let owner = Uuid::new_v4();
    let aad = aad_for(tenant, "device_credential", Some(owner));
    let record = seal(&keyring, &aad, b"secret").unwrap();

    // Same tenant, different owner.
    let wrong_owner = aad_for(tenant, "device_credential", Some(Uuid::new_v4()));
    assert!(matches!(open(&keyring, &wrong_owner, &record), Err(EnvelopeError::Integrity)));

    // Same owner, different purpose.
    let wrong_purpose = aad_for(tenant, "onvif_bootstrap", Some(owner));
    assert!(matches!(open(&keyring, &wrong_purpose, &record), Err(EnvelopeError::Integrity)));
}

#[test]
fn tampered_ciphertext_fails_verification() {
    let keyring = keyring_with("k1");
    let aad = aad_for(TenantId::generate(), "device_credential", None);
    let mut record = seal(&keyring, &aad, b"secret").unwrap();
    if let Some(byte) = record.payload_ciphertext.first_mut() {
        *byte ^= 0xFF;
    }
    assert!(matches!(open(&keyring, &aad, &record), Err(EnvelopeError::Integrity)));
}

#[test]
fn records_sealed_under_old_key_stay_readable_after_rotation() {
    let old_active = keyring_with("k1");
    let aad = aad_for(TenantId::generate(), "device_credential", None);
    let record = seal(&old_active, &aad, b"legacy").unwrap();

    // Rotation: k2 becomes active, k1 stays loaded.
    let rotated = keyring_with("k2");
    let plaintext = open(&rotated, &aad, &record).unwrap();
    assert_eq!(plaintext, b"legacy");
}

#[test]
fn rewrap_moves_record_to_active_key_without_reencrypting_payload() {
    let old_active = keyring_with("k1");
    let aad = aad_for(TenantId::generate(), "device_credential", None);
    let record = seal(&old_active, &aad, b"legacy").unwrap();

    let rotated = keyring_with("k2");
    let rewrapped = rewrap(&rotated, &aad, &record).unwrap();
    assert_eq!(rewrapped.master_key_id, "k2");
    assert_eq!(rewrapped.payload_ciphertext, record.payload_ciphertext);
    assert_eq!(open(&rotated, &aad, &rewrapped).unwrap(), b"legacy");
}

#[test]
fn unknown_master_key_id_is_reported() {
    let keyring = keyring_with("k1");
    let aad = aad_for(TenantId::generate(), "device_credential", None);
    let mut record = seal(&keyring, &aad, b"secret").unwrap();
    record.master_key_id = "retired".to_string();
    assert!(matches!(open(&keyring, &aad, &record), Err(EnvelopeError::Keyring(_))));
}
