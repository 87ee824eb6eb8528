// crates/vigil-server/tests/auth_flows.rs
// ============================================================================
// Module: Auth Flow Tests
// Description: Login, refresh rotation, logout, reset, fail-closed paths.
// Purpose: Pin the identity contract at the service seam.
// Dependencies: vigil-server, vigil-core, vigil-crypto
// ============================================================================

//! Identity service tests with an in-memory directory and token store.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use time::OffsetDateTime;
use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::InMemoryTokenStore;
use vigil_core::Tenant;
use vigil_core::TenantId;
use vigil_core::TokenStore;
use vigil_core::User;
use vigil_core::UserId;
use vigil_crypto::PASSWORD_ALGO;
use vigil_crypto::hash_password;
use vigil_server::auth::AuthService;
use vigil_server::auth::UserDirectory;
use vigil_server::auth::service_token_matches;

/// Directory fake: one tenant, one user, scriptable outage.
struct FakeDirectory {
    tenant: Tenant,
    user: Mutex<User>,
    down: AtomicBool,
}

impl FakeDirectory {
    fn check_up(&self) -> Result<(), DomainError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DomainError::unavailable("db_down", "scripted outage"));
        }
        Ok(())
    }
}

impl UserDirectory for FakeDirectory {
    fn find_tenant(&self, name: &str) -> Result<Option<Tenant>, DomainError> {
        self.check_up()?;
        Ok((name == self.tenant.name).then(|| self.tenant.clone()))
    }

    fn find_user(&self, tenant_id: TenantId, email: &str) -> Result<Option<User>, DomainError> {
        self.check_up()?;
        let user = self.user.lock().unwrap().clone();
        Ok((tenant_id == self.tenant.id && user.email.eq_ignore_ascii_case(email))
            .then_some(user))
    }

    fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>, DomainError> {
        self.check_up()?;
        let user = self.user.lock().unwrap().clone();
        Ok((tenant_id == self.tenant.id && user.id == user_id).then_some(user))
    }

    fn set_password(
        &self,
        _tenant_id: TenantId,
        _user_id: UserId,
        password_hash: &str,
        password_algo: &str,
    ) -> Result<(), DomainError> {
        self.check_up()?;
        let mut user = self.user.lock().unwrap();
        user.password_hash = password_hash.to_string();
        user.password_algo = password_algo.to_string();
        Ok(())
    }
}

const JWT_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// JWT expiry validates against the real clock, so these flows use it too.
fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn harness(password: &str) -> (AuthService, Arc<FakeDirectory>, Arc<InMemoryTokenStore>) {
    let tenant = Tenant {
        id: TenantId::generate(),
        name: "acme".to_string(),
        created_at: now(),
    };
    let user = User {
        id: UserId::generate(),
        tenant_id: tenant.id,
        email: "ops@acme.example".to_string(),
        password_hash: hash_password(password).unwrap(),
        password_algo: PASSWORD_ALGO.to_string(),
        password_updated_at: now(),
        disabled: false,
        deleted_at: None,
        created_at: now(),
    };
    let directory = Arc::new(FakeDirectory {
        tenant,
        user: Mutex::new(user),
        down: AtomicBool::new(false),
    });
    let tokens = Arc::new(InMemoryTokenStore::new());
    let service = AuthService::new(
        JWT_SECRET,
        Arc::clone(&tokens) as Arc<dyn TokenStore>,
        Arc::clone(&directory) as Arc<dyn UserDirectory>,
    );
    (service, directory, tokens)
}

#[test]
fn login_returns_verifiable_access_token() {
    let (service, directory, _) = harness("correct horse battery staple");
    let pair = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap();
    let context = service.verify_access_token(&pair.access_token).unwrap();
    assert_eq!(context.tenant_id, directory.tenant.id);
    assert_eq!(context.user_id, directory.user.lock().unwrap().id);
}

#[test]
fn wrong_password_and_unknown_user_are_indistinguishable() {
    let (service, _, _) = harness("correct horse battery staple");
    let wrong_password = service
        .login("acme", "ops@acme.example", "wrong", now())
        .unwrap_err();
    let unknown_user = service
        .login("acme", "ghost@acme.example", "wrong", now())
        .unwrap_err();
    assert_eq!(wrong_password.kind, ErrorKind::Auth);
    assert_eq!(wrong_password.reason_code, unknown_user.reason_code);
}

#[test]
fn store_outage_fails_closed_not_as_bad_credentials() {
    let (service, directory, _) = harness("correct horse battery staple");
    directory.down.store(true, Ordering::SeqCst);
    let err = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DependencyUnavailable);
}

#[test]
fn refresh_rotates_the_token() {
    let (service, _, _) = harness("correct horse battery staple");
    let pair = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap();
    let rotated = service.refresh(&pair.refresh_token, now()).unwrap();
    assert_ne!(pair.refresh_token, rotated.refresh_token);

    // The original token was consumed by the rotation.
    let err = service.refresh(&pair.refresh_token, now()).unwrap_err();
    assert_eq!(err.reason_code, "refresh_invalid");

    // The rotated token still works.
    service.refresh(&rotated.refresh_token, now()).unwrap();
}

#[test]
fn logout_revokes_the_refresh_token() {
    let (service, _, _) = harness("correct horse battery staple");
    let pair = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap();
    service.logout(&pair.refresh_token, now()).unwrap();
    let err = service.refresh(&pair.refresh_token, now()).unwrap_err();
    assert_eq!(err.reason_code, "refresh_invalid");
}

#[test]
fn disabled_account_cannot_login_or_refresh() {
    let (service, directory, _) = harness("correct horse battery staple");
    let pair = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap();
    directory.user.lock().unwrap().disabled = true;

    let login_err = service
        .login("acme", "ops@acme.example", "correct horse battery staple", now())
        .unwrap_err();
    assert_eq!(login_err.reason_code, "account_disabled");

    let refresh_err = service.refresh(&pair.refresh_token, now()).unwrap_err();
    assert_eq!(refresh_err.reason_code, "account_disabled");
}

#[test]
fn complete_reset_rewrites_the_hash_and_consumes_the_token() {
    let (service, directory, tokens) = harness("old password dozen chars");
    let user_id = directory.user.lock().unwrap().id;
    let tenant_id = directory.tenant.id;
    tokens
        .store_reset(
            &vigil_server::auth::token_hash("reset-token"),
            tenant_id,
            user_id,
            3_600,
            now(),
        )
        .unwrap();

    service.complete_reset("reset-token", "brand new password here", now()).unwrap();
    service
        .login("acme", "ops@acme.example", "brand new password here", now())
        .unwrap();

    // The reset token was single-use.
    let err = service
        .complete_reset("reset-token", "another password entirely", now())
        .unwrap_err();
    assert_eq!(err.reason_code, "reset_invalid");
}

#[test]
fn short_reset_password_is_rejected() {
    let (service, _, _) = harness("old password dozen chars");
    let err = service.complete_reset("reset-token", "short", now()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn garbage_bearer_tokens_are_rejected() {
    let (service, _, _) = harness("correct horse battery staple");
    assert!(service.verify_access_token("not-a-jwt").is_err());
}

#[test]
fn service_token_comparison_is_exact_and_disabled_when_unset() {
    assert!(service_token_matches(Some("svc-token"), "svc-token"));
    assert!(!service_token_matches(Some("svc-token"), "svc-tokem"));
    assert!(!service_token_matches(None, "anything"));
}
