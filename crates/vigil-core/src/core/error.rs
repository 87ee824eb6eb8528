// crates/vigil-core/src/core/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: Closed set of error kinds raised by the control plane.
// Purpose: Give every failure a machine-readable kind and reason code.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The control plane never matches on error message strings. Every failure
//! carries an [`ErrorKind`] from the closed set below plus a stable
//! `reason_code` label. Controllers translate kinds into HTTP statuses;
//! background workers log them and continue.
//!
//! ## Invariants
//! - The kind set is closed; new failure modes must map onto an existing kind.
//! - Reason codes are lowercase snake-case and stable across releases.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Closed set of error kinds the control plane raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range; surfaced to the caller with a field hint.
    Validation,
    /// Invalid or expired credentials; never retried.
    Auth,
    /// Valid identity with insufficient grant.
    Permission,
    /// Uniqueness or state-machine violation.
    Conflict,
    /// Target does not exist, or must be indistinguishable from a deny.
    NotFound,
    /// Operation denied by the current license state.
    LicenseBlocked,
    /// Caller exceeded a rate or concurrency limit.
    RateLimited,
    /// A required backing store is unavailable.
    DependencyUnavailable,
    /// A device or external collaborator timed out or failed transiently.
    TransientExternal,
    /// Envelope AAD mismatch, signature failure, or other integrity fault.
    DataCorruption,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::LicenseBlocked => "license_blocked",
            Self::RateLimited => "rate_limited",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::TransientExternal => "transient_external",
            Self::DataCorruption => "data_corruption",
            Self::Internal => "internal",
        }
    }

    /// Returns true when a caller may safely retry the operation.
    #[must_use]
    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::DependencyUnavailable | Self::TransientExternal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Domain Error
// ============================================================================

/// A classified failure raised by a domain service.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {reason_code}: {message}")]
pub struct DomainError {
    /// Error kind from the closed taxonomy.
    pub kind: ErrorKind,
    /// Stable machine-readable reason code.
    pub reason_code: &'static str,
    /// Human-readable message; never parsed by callers.
    pub message: String,
    /// Offending field name for validation failures.
    pub field: Option<&'static str>,
}

impl DomainError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, reason_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason_code,
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error with a field hint.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            reason_code: "invalid_input",
            message: message.into(),
            field: Some(field),
        }
    }

    /// Creates a not-found error that is safe to surface where leakage matters.
    #[must_use]
    pub fn not_found(reason_code: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, reason_code, "not found")
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(reason_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, reason_code, message)
    }

    /// Creates a dependency-unavailable error.
    #[must_use]
    pub fn unavailable(reason_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyUnavailable, reason_code, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "internal_error", message)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(ErrorKind::LicenseBlocked.as_str(), "license_blocked");
        assert_eq!(ErrorKind::DependencyUnavailable.as_str(), "dependency_unavailable");
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::TransientExternal.retryable());
        assert!(ErrorKind::RateLimited.retryable());
        assert!(!ErrorKind::Auth.retryable());
        assert!(!ErrorKind::DataCorruption.retryable());
    }

    #[test]
    fn validation_error_carries_field_hint() {
        let err = DomainError::validation("port", "port must be 1-65535");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.field, Some("port"));
    }
}
