// crates/vigil-crypto/src/license_file.rs
// ============================================================================
// Module: License File Verification
// Description: RS256 license envelope parsing and signature verification.
// Purpose: Turn on-disk license bytes into a verified payload or a typed
//          failure the license state machine can classify.
// Dependencies: base64, rsa, serde_json, sha2
// ============================================================================

//! ## Overview
//! The on-disk license is a JSON envelope `{payload_b64, sig_b64, alg}`.
//! Verification enforces the file-size cap, requires `alg == "RS256"`,
//! checks the RSA-PKCS#1 v1.5 / SHA-256 signature over the raw payload
//! bytes against the configured public key, and only then decodes the
//! payload JSON. Failures map one-to-one onto license states.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use vigil_core::LicensePayload;
use vigil_core::MAX_LICENSE_FILE_BYTES;

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// The on-disk license envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseEnvelope {
    /// Base64 of the raw payload JSON bytes.
    pub payload_b64: String,
    /// Base64 of the RSA signature over the raw payload bytes.
    pub sig_b64: String,
    /// Signature algorithm; only `RS256` is accepted.
    pub alg: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// License file verification failures.
#[derive(Debug, Clone, Error)]
pub enum LicenseFileError {
    /// The file exceeded the size cap.
    #[error("license file exceeds {MAX_LICENSE_FILE_BYTES} bytes")]
    FileTooLarge,
    /// The envelope or payload JSON failed to decode.
    #[error("license envelope malformed: {0}")]
    Malformed(String),
    /// The envelope names an unsupported algorithm.
    #[error("unsupported license algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The configured public key failed to parse.
    #[error("license public key invalid: {0}")]
    BadPublicKey(String),
    /// The signature did not verify.
    #[error("license signature verification failed")]
    BadSignature,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Parses and verifies license file bytes against a PEM public key.
///
/// # Errors
///
/// Returns [`LicenseFileError`] classifying the failure; callers map
/// `BadSignature` to the invalid-signature license state and the rest to
/// parse errors.
pub fn parse_and_verify(
    file_bytes: &[u8],
    public_key_pem: &str,
) -> Result<LicensePayload, LicenseFileError> {
    if file_bytes.len() as u64 > MAX_LICENSE_FILE_BYTES {
        return Err(LicenseFileError::FileTooLarge);
    }
    let envelope: LicenseEnvelope = serde_json::from_slice(file_bytes)
        .map_err(|err| LicenseFileError::Malformed(err.to_string()))?;
    if envelope.alg != "RS256" {
        return Err(LicenseFileError::UnsupportedAlgorithm(envelope.alg));
    }
    let payload_bytes = BASE64
        .decode(envelope.payload_b64.as_bytes())
        .map_err(|err| LicenseFileError::Malformed(err.to_string()))?;
    let signature = BASE64
        .decode(envelope.sig_b64.as_bytes())
        .map_err(|err| LicenseFileError::Malformed(err.to_string()))?;

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|err| LicenseFileError::BadPublicKey(err.to_string()))?;
    let digest = Sha256::digest(&payload_bytes);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .map_err(|_| LicenseFileError::BadSignature)?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|err| LicenseFileError::Malformed(err.to_string()))
}
