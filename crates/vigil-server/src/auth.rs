// crates/vigil-server/src/auth.rs
// ============================================================================
// Module: Identity & Tokens
// Description: Password login, JWT access tokens, rotating refresh tokens.
// Purpose: Authenticate callers and derive the tenant every request runs
//          under. Fail closed whenever a backing store is down.
// Dependencies: jsonwebtoken, sha2, vigil-core, vigil-crypto
// ============================================================================

//! ## Overview
//! Access tokens are short-lived HS256 JWTs carrying the subject and tenant.
//! Refresh tokens are opaque 256-bit values stored by hash and consumed on
//! use, so every refresh rotates the token. The tenant in the claims is the
//! only tenant a request can act under; request bodies never influence
//! authorization scope.
//!
//! ## Invariants
//! - Auth paths fail closed: a store error is `dependency_unavailable`,
//!   never an allow.
//! - Login failures are indistinguishable between unknown user and wrong
//!   password.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::Tenant;
use vigil_core::TenantId;
use vigil_core::TokenStore;
use vigil_core::User;
use vigil_core::UserId;
use vigil_crypto::PASSWORD_ALGO;
use vigil_crypto::hash_password;
use vigil_crypto::verify_password;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Access token lifetime in seconds.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 900;

/// Refresh token lifetime in seconds.
pub const REFRESH_TOKEN_TTL_SECS: u64 = 14 * 24 * 3600;

// ============================================================================
// SECTION: Types
// ============================================================================

/// JWT claims carried by access tokens.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject user id.
    sub: String,
    /// Tenant id the token acts under.
    ten: String,
    /// Issued-at (unix seconds).
    iat: i64,
    /// Expiry (unix seconds).
    exp: i64,
}

/// The authenticated caller context derived from a verified token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant every operation in the request is scoped to.
    pub tenant_id: TenantId,
    /// Acting user.
    pub user_id: UserId,
    /// Correlation id of the request.
    pub request_id: Option<String>,
    /// Caller IP, when known.
    pub client_ip: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

/// Tokens returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer access token.
    pub access_token: String,
    /// Opaque rotating refresh token.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Identity lookups the auth service needs from the relational store.
pub trait UserDirectory: Send + Sync {
    /// Finds a tenant by name.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn find_tenant(&self, name: &str) -> Result<Option<Tenant>, DomainError>;

    /// Finds a live user by email within a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn find_user(&self, tenant_id: TenantId, email: &str) -> Result<Option<User>, DomainError>;

    /// Loads a live user by id within a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>, DomainError>;

    /// Rewrites a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the store is unavailable.
    fn set_password(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        password_hash: &str,
        password_algo: &str,
    ) -> Result<(), DomainError>;
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Identity service: login, refresh, logout, reset completion, verification.
pub struct AuthService {
    /// HS256 signing secret.
    jwt_secret: Vec<u8>,
    /// Opaque token storage.
    tokens: Arc<dyn TokenStore>,
    /// Identity lookups.
    directory: Arc<dyn UserDirectory>,
}

impl AuthService {
    /// Builds the service.
    #[must_use]
    pub fn new(
        jwt_secret: &str,
        tokens: Arc<dyn TokenStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            jwt_secret: jwt_secret.as_bytes().to_vec(),
            tokens,
            directory,
        }
    }

    /// Authenticates a user by tenant name, email, and password.
    ///
    /// # Errors
    ///
    /// Returns an auth failure for any credential mismatch and a
    /// dependency failure when a store is down.
    pub fn login(
        &self,
        tenant_name: &str,
        email: &str,
        password: &str,
        now: OffsetDateTime,
    ) -> Result<TokenPair, DomainError> {
        let Some(tenant) = self.directory.find_tenant(tenant_name)? else {
            return Err(invalid_credentials());
        };
        let Some(user) = self.directory.find_user(tenant.id, email)? else {
            return Err(invalid_credentials());
        };
        if user.disabled {
            return Err(DomainError::new(
                ErrorKind::Auth,
                "account_disabled",
                "account disabled",
            ));
        }
        let verified = verify_password(password, &user.password_hash).map_err(|err| {
            DomainError::new(ErrorKind::DataCorruption, "password_hash_corrupt", err.to_string())
        })?;
        if !verified {
            return Err(invalid_credentials());
        }
        self.issue_pair(tenant.id, user.id, now)
    }

    /// Rotates a refresh token into a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns an auth failure for unknown or expired tokens.
    pub fn refresh(
        &self,
        refresh_token: &str,
        now: OffsetDateTime,
    ) -> Result<TokenPair, DomainError> {
        let hash = token_hash(refresh_token);
        let Some((tenant_id, user_id)) =
            self.tokens.take_refresh(&hash, now).map_err(DomainError::from)?
        else {
            return Err(DomainError::new(
                ErrorKind::Auth,
                "refresh_invalid",
                "refresh token invalid or expired",
            ));
        };
        // The user may have been disabled or deleted since issue.
        let Some(user) = self.directory.get_user(tenant_id, user_id)? else {
            return Err(invalid_credentials());
        };
        if user.disabled {
            return Err(DomainError::new(
                ErrorKind::Auth,
                "account_disabled",
                "account disabled",
            ));
        }
        self.issue_pair(tenant_id, user_id, now)
    }

    /// Revokes a refresh token.
    ///
    /// # Errors
    ///
    /// Returns a dependency failure when the token store is down; unknown
    /// tokens revoke as a no-op.
    pub fn logout(&self, refresh_token: &str, now: OffsetDateTime) -> Result<(), DomainError> {
        let hash = token_hash(refresh_token);
        self.tokens.take_refresh(&hash, now).map_err(DomainError::from)?;
        Ok(())
    }

    /// Completes a password reset: consumes the reset token and rewrites
    /// the hash.
    ///
    /// # Errors
    ///
    /// Returns an auth failure for unknown tokens and a validation failure
    /// for unusable passwords.
    pub fn complete_reset(
        &self,
        reset_token: &str,
        new_password: &str,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        if new_password.len() < 12 {
            return Err(DomainError::validation(
                "new_password",
                "password must be at least 12 characters",
            ));
        }
        let hash = token_hash(reset_token);
        let Some((tenant_id, user_id)) =
            self.tokens.take_reset(&hash, now).map_err(DomainError::from)?
        else {
            return Err(DomainError::new(
                ErrorKind::Auth,
                "reset_invalid",
                "reset token invalid or expired",
            ));
        };
        let password_hash = hash_password(new_password).map_err(|err| {
            DomainError::new(ErrorKind::Internal, "hash_failed", err.to_string())
        })?;
        self.directory.set_password(tenant_id, user_id, &password_hash, PASSWORD_ALGO)
    }

    /// Verifies a bearer access token into an auth context.
    ///
    /// # Errors
    ///
    /// Returns an auth failure for invalid or expired tokens.
    pub fn verify_access_token(&self, token: &str) -> Result<AuthContext, DomainError> {
        let decoded = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.jwt_secret),
            &Validation::default(),
        )
        .map_err(|_| DomainError::new(ErrorKind::Auth, "token_invalid", "invalid token"))?;
        let user_id = decoded
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| DomainError::new(ErrorKind::Auth, "token_invalid", "invalid token"))?;
        let tenant_id = decoded
            .claims
            .ten
            .parse::<TenantId>()
            .map_err(|_| DomainError::new(ErrorKind::Auth, "token_invalid", "invalid token"))?;
        Ok(AuthContext {
            tenant_id,
            user_id,
            request_id: None,
            client_ip: None,
            user_agent: None,
        })
    }

    /// Issues an access/refresh pair for a subject.
    fn issue_pair(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<TokenPair, DomainError> {
        let claims = Claims {
            sub: user_id.to_string(),
            ten: tenant_id.to_string(),
            iat: now.unix_timestamp(),
            exp: now.unix_timestamp() + i64::try_from(ACCESS_TOKEN_TTL_SECS).unwrap_or(900),
        };
        let access_token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.jwt_secret),
        )
        .map_err(|err| DomainError::new(ErrorKind::Internal, "jwt_encode", err.to_string()))?;

        let refresh_token = random_token();
        self.tokens
            .store_refresh(
                &token_hash(&refresh_token),
                tenant_id,
                user_id,
                REFRESH_TOKEN_TTL_SECS,
                now,
            )
            .map_err(DomainError::from)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: ACCESS_TOKEN_TTL_SECS,
        })
    }
}

// ============================================================================
// SECTION: Service Tokens
// ============================================================================

/// Verifies the internal service token in constant time.
#[must_use]
pub fn service_token_matches(configured: Option<&str>, presented: &str) -> bool {
    let Some(configured) = configured else {
        // No token configured means internal endpoints are disabled.
        return false;
    };
    let configured = Sha256::digest(configured.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    configured.as_slice().ct_eq(presented.as_slice()).into()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// The uniform auth failure for credential mismatches.
fn invalid_credentials() -> DomainError {
    DomainError::new(ErrorKind::Auth, "invalid_credentials", "invalid credentials")
}

/// Generates an opaque 256-bit token.
fn random_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut token = String::with_capacity(64);
    for byte in bytes {
        token.push_str(&format!("{byte:02x}"));
    }
    token
}

/// Hashes a token for storage lookup.
#[must_use]
pub fn token_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
