// crates/vigil-crypto/src/password.rs
// ============================================================================
// Module: Password Hashing
// Description: Argon2id hashing and verification for user passwords.
// Purpose: Keep password handling behind one narrow, misuse-resistant seam.
// Dependencies: argon2
// ============================================================================

//! ## Overview
//! Passwords hash with Argon2id under the crate defaults and serialize in PHC
//! string format, which embeds the algorithm, parameters, and salt. The
//! stored algorithm label lets the user table record what produced the hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use argon2::Argon2;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Algorithm label stored alongside user password hashes.
pub const PASSWORD_ALGO: &str = "argon2id";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Password hashing failures.
#[derive(Debug, Clone, Error)]
pub enum PasswordError {
    /// Hashing failed (salt generation or parameter error).
    #[error("password hashing failed: {0}")]
    Hash(String),
    /// A stored hash failed to parse as a PHC string.
    #[error("stored password hash malformed: {0}")]
    MalformedHash(String),
}

// ============================================================================
// SECTION: Hash / Verify
// ============================================================================

/// Hashes a password with Argon2id and a fresh salt.
///
/// # Errors
///
/// Returns [`PasswordError::Hash`] when hashing fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Verifies a password against a stored PHC hash.
///
/// # Errors
///
/// Returns [`PasswordError::MalformedHash`] when the stored hash fails to
/// parse. A wrong password is `Ok(false)`, not an error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| PasswordError::MalformedHash(err.to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = hash_password("secret").unwrap();
        let second = hash_password("secret").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let err = verify_password("anything", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, PasswordError::MalformedHash(_)));
    }
}
