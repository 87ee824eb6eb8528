// crates/vigil-devices/src/error.rs
// ============================================================================
// Module: Device Errors
// Description: Typed failures for device probing and adapter calls.
// Purpose: Classify device I/O into the coarse codes the stores persist.
// Dependencies: thiserror, vigil-core
// ============================================================================

//! ## Overview
//! Device interactions fail in a handful of ways the control plane cares
//! about: timeouts, rejected credentials, protocol garbage, and client
//! construction faults. Each failure maps to a coarse `last_error_code`
//! persisted on the probed entity and onto the closed error taxonomy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use vigil_core::ErrorKind;

// ============================================================================
// SECTION: Error
// ============================================================================

/// Device probe and adapter failures.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device did not answer within the deadline.
    #[error("device timeout: {0}")]
    Timeout(String),
    /// The device rejected the supplied credentials.
    #[error("device rejected credentials")]
    Unauthorized,
    /// The device answered with something unparseable.
    #[error("device protocol error: {0}")]
    Protocol(String),
    /// Transport-level failure (connect refused, reset, DNS).
    #[error("device io error: {0}")]
    Io(String),
    /// The HTTP client could not be constructed.
    #[error("device client init error: {0}")]
    ClientInit(String),
}

impl DeviceError {
    /// Returns the coarse error code persisted with probe state.
    #[must_use]
    pub const fn coarse_code(&self) -> &'static str {
        match self {
            Self::Timeout(_) | Self::Unauthorized => "onvif_unauthorized_or_timeout",
            Self::Protocol(_) => "device_protocol_error",
            Self::Io(_) => "device_unreachable",
            Self::ClientInit(_) => "client_init_error",
        }
    }

    /// Maps the failure onto the closed error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) | Self::Io(_) => ErrorKind::TransientExternal,
            Self::Unauthorized => ErrorKind::Auth,
            Self::Protocol(_) => ErrorKind::TransientExternal,
            Self::ClientInit(_) => ErrorKind::Internal,
        }
    }
}

/// Classifies a reqwest failure into a device error.
#[must_use]
pub fn classify_http_error(err: &reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout(err.to_string())
    } else if err.is_connect() {
        DeviceError::Io(err.to_string())
    } else {
        DeviceError::Protocol(err.to_string())
    }
}
