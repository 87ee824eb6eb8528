// crates/vigil-server/src/errors.rs
// ============================================================================
// Module: API Error Envelope
// Description: JSON error responses mapped from the closed error taxonomy.
// Purpose: Translate domain failures into the HTTP contract.
// Dependencies: axum, serde_json, vigil-core
// ============================================================================

//! ## Overview
//! Controllers never build status codes by hand: every failure flows through
//! [`ApiError`], which maps kinds onto statuses and renders the JSON-body
//! envelope. Permission denials on specific targets render as not-found so
//! existence never leaks across tenants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::Value;
use serde_json::json;

use vigil_core::DomainError;
use vigil_core::ErrorKind;
use vigil_core::LIVE_LIMIT_ERROR;
use vigil_core::MAX_SESSIONS_PER_USER;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// An API failure ready to render.
#[derive(Debug)]
pub struct ApiError {
    /// Classified kind.
    pub kind: ErrorKind,
    /// Stable machine-readable reason code.
    pub reason_code: String,
    /// Human-readable message.
    pub message: String,
    /// Offending field for validation failures.
    pub field: Option<&'static str>,
    /// Extra envelope fields (e.g. live-limit counts).
    pub extra: Option<Value>,
    /// `Retry-After` seconds for rate limits.
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Builds an error from kind and reason code.
    #[must_use]
    pub fn new(kind: ErrorKind, reason_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason_code: reason_code.into(),
            message: message.into(),
            field: None,
            extra: None,
            retry_after_secs: None,
        }
    }

    /// Builds a validation error with a field hint.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Validation, "invalid_input", message);
        err.field = Some(field);
        err
    }

    /// Builds the live-session cap rejection with its contract body.
    #[must_use]
    pub fn live_limit(active: usize) -> Self {
        let mut err = Self::new(
            ErrorKind::RateLimited,
            "live_limit_exceeded",
            "live session limit reached",
        );
        err.extra = Some(json!({
            "error": LIVE_LIMIT_ERROR,
            "limit": MAX_SESSIONS_PER_USER,
            "active": active,
        }));
        err
    }

    /// Builds an auth failure (401).
    #[must_use]
    pub fn unauthenticated(reason_code: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, reason_code, "authentication required")
    }

    /// Builds a not-found indistinguishable from a permission deny.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "not_found", "not found")
    }

    /// Maps the kind onto its HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Permission | ErrorKind::LicenseBlocked => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::TransientExternal | ErrorKind::DataCorruption | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self {
            kind: err.kind,
            reason_code: err.reason_code.to_string(),
            message: err.message,
            field: err.field,
            extra: None,
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.extra.clone().unwrap_or_else(|| {
            let mut body = json!({
                "error": self.reason_code,
                "message": self.message,
            });
            if let (Some(field), Some(map)) = (self.field, body.as_object_mut()) {
                map.insert("field".to_string(), Value::String(field.to_string()));
            }
            body
        });
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(retry_after) = self.retry_after_secs {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn statuses_follow_the_contract() {
        assert_eq!(ApiError::validation("port", "bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthenticated("expired").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::live_limit(16).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::new(ErrorKind::DependencyUnavailable, "redis", "down").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn live_limit_body_matches_contract() {
        let err = ApiError::live_limit(16);
        let body = err.extra.unwrap();
        assert_eq!(body["error"], "LIVE_LIMIT_EXCEEDED");
        assert_eq!(body["limit"], 16);
        assert_eq!(body["active"], 16);
    }
}
