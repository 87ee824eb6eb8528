// crates/vigil-core/src/core/identifiers.rs
// ============================================================================
// Module: Vigil Identifiers
// Description: Canonical UUID-backed identifiers for control-plane entities.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical UUID-backed identifiers used throughout
//! the Vigil control plane. Identifiers are opaque and serialize as their
//! hyphenated string form. Ownership and scoping rules are enforced at the
//! store and service boundaries rather than within these simple wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Parse Error
// ============================================================================

/// Error returned when an identifier fails to parse as a UUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct IdentifierParseError(pub String);

/// Declares a UUID-backed identifier newtype with the shared impl surface.
macro_rules! uuid_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            #[must_use]
            pub const fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierParseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value)
                    .map(Self)
                    .map_err(|_| IdentifierParseError(value.to_string()))
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

uuid_identifier! {
    /// Tenant identifier. Root of every ownership scope.
    TenantId
}

uuid_identifier! {
    /// Site identifier, scoped to one tenant.
    SiteId
}

uuid_identifier! {
    /// User identifier, scoped to one tenant.
    UserId
}

uuid_identifier! {
    /// Role identifier, scoped to one tenant.
    RoleId
}

uuid_identifier! {
    /// Camera identifier, scoped to one tenant and site.
    CameraId
}

uuid_identifier! {
    /// Camera group identifier, scoped to one tenant.
    GroupId
}

uuid_identifier! {
    /// NVR identifier, scoped to one tenant and site.
    NvrId
}

uuid_identifier! {
    /// NVR channel identifier, scoped to one NVR.
    ChannelId
}

uuid_identifier! {
    /// Encrypted credential identifier.
    CredentialId
}

uuid_identifier! {
    /// Discovery run identifier.
    DiscoveryRunId
}

uuid_identifier! {
    /// Discovered device identifier, scoped to one discovery run.
    DeviceId
}

uuid_identifier! {
    /// Viewer session identifier.
    SessionId
}

uuid_identifier! {
    /// Health alert identifier.
    AlertId
}

uuid_identifier! {
    /// Audit event identifier, used as the idempotency key for writes.
    AuditEventId
}
