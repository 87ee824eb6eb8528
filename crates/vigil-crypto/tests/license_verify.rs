// crates/vigil-crypto/tests/license_verify.rs
// ============================================================================
// Module: License Verification Tests
// Description: Sign-then-verify laws for the RS256 license envelope.
// Purpose: Pin signature, algorithm, and size-cap enforcement.
// Dependencies: vigil-crypto, rsa
// ============================================================================

//! License envelope verification tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rsa::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use rsa::RsaPublicKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::pkcs8::LineEnding;
use sha2::Digest;
use sha2::Sha256;
use vigil_crypto::LicenseFileError;
use vigil_crypto::parse_and_verify;

fn test_keypair() -> (RsaPrivateKey, String) {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let public_pem = RsaPublicKey::from(&private).to_public_key_pem(LineEnding::LF).unwrap();
    (private, public_pem)
}

fn sample_payload_json() -> Vec<u8> {
    serde_json::json!({
        "license_id": "lic-001",
        "customer_name": "Acme Surveillance",
        "tenant_scope": "acme",
        "issued_at_utc": "2025-01-01T00:00:00Z",
        "valid_until_utc": "2026-01-01T00:00:00Z",
        "limits": { "max_cameras": 64, "max_nvrs": 4 },
        "features": { "weapon_detection": true }
    })
    .to_string()
    .into_bytes()
}

fn sign_envelope(private: &RsaPrivateKey, payload: &[u8], alg: &str) -> Vec<u8> {
    let digest = Sha256::digest(payload);
    let signature = private.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();
    serde_json::json!({
        "payload_b64": BASE64.encode(payload),
        "sig_b64": BASE64.encode(signature),
        "alg": alg,
    })
    .to_string()
    .into_bytes()
}

#[test]
fn signed_envelope_verifies_and_decodes() {
    let (private, public_pem) = test_keypair();
    let file = sign_envelope(&private, &sample_payload_json(), "RS256");
    let payload = parse_and_verify(&file, &public_pem).unwrap();
    assert_eq!(payload.license_id, "lic-001");
    assert_eq!(payload.limits.max_cameras, 64);
    assert!(payload.feature_enabled("weapon_detection"));
    assert!(!payload.feature_enabled("face_recognition"));
}

#[test]
fn tampered_payload_fails_signature() {
    let (private, public_pem) = test_keypair();
    let file = sign_envelope(&private, &sample_payload_json(), "RS256");
    // Swap in a forged payload with inflated limits; the signature still
    // covers the original bytes.
    let mut envelope: serde_json::Value = serde_json::from_slice(&file).unwrap();
    let forged = serde_json::json!({
        "license_id": "lic-001",
        "customer_name": "Acme Surveillance",
        "tenant_scope": "acme",
        "issued_at_utc": "2025-01-01T00:00:00Z",
        "valid_until_utc": "2036-01-01T00:00:00Z",
        "limits": { "max_cameras": 10_000, "max_nvrs": 400 },
        "features": {}
    })
    .to_string();
    envelope["payload_b64"] = serde_json::Value::String(BASE64.encode(forged.as_bytes()));
    let forged_file = envelope.to_string().into_bytes();
    assert!(matches!(
        parse_and_verify(&forged_file, &public_pem),
        Err(LicenseFileError::BadSignature)
    ));
}

#[test]
fn wrong_key_fails_signature() {
    let (private, _) = test_keypair();
    let (_, other_public_pem) = test_keypair();
    let file = sign_envelope(&private, &sample_payload_json(), "RS256");
    assert!(matches!(
        parse_and_verify(&file, &other_public_pem),
        Err(LicenseFileError::BadSignature)
    ));
}

#[test]
fn unsupported_algorithm_is_rejected_before_verification() {
    let (private, public_pem) = test_keypair();
    let file = sign_envelope(&private, &sample_payload_json(), "ES256");
    assert!(matches!(
        parse_and_verify(&file, &public_pem),
        Err(LicenseFileError::UnsupportedAlgorithm(_))
    ));
}

#[test]
fn oversized_file_is_rejected() {
    let (_, public_pem) = test_keypair();
    let oversized = vec![b'{'; 64 * 1024 + 1];
    assert!(matches!(
        parse_and_verify(&oversized, &public_pem),
        Err(LicenseFileError::FileTooLarge)
    ));
}

#[test]
fn garbage_bytes_are_malformed() {
    let (_, public_pem) = test_keypair();
    assert!(matches!(
        parse_and_verify(b"not json at all", &public_pem),
        Err(LicenseFileError::Malformed(_))
    ));
}
