// crates/vigil-devices/src/adapters/mod.rs
// ============================================================================
// Module: NVR Adapters
// Description: Vendor adapter interface and the name-keyed registry.
// Purpose: Let the poller and NVR services talk to any vendor through one
//          capability set.
// Dependencies: vigil-core
// ============================================================================

//! ## Overview
//! Every vendor exposes the same four capabilities: connection test, device
//! identity, channel listing, and cursor-based event polling. Adapters are
//! registered by vendor name at startup; the poller resolves them through
//! the registry and never names a vendor type directly.
//!
//! ## Invariants
//! - `poll_events` returns events in occurrence order with a cursor that
//!   resumes strictly after the last returned event.
//! - Adapters never retain credentials beyond one call.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dahua;
pub mod hikvision;
pub mod onvif;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use vigil_core::NvrVendor;
use vigil_core::PlainCredential;
use vigil_core::RawNvrEvent;

use crate::error::DeviceError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A vendor-neutral NVR endpoint to operate against.
#[derive(Debug, Clone)]
pub struct NvrEndpoint {
    /// Device IP or host.
    pub host: String,
    /// Device port.
    pub port: u16,
    /// Whether to use HTTPS.
    pub https: bool,
}

impl NvrEndpoint {
    /// Renders the base URL for HTTP APIs.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Device identity as reported by the NVR.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NvrDeviceInfo {
    /// Model name.
    pub model: Option<String>,
    /// Firmware version.
    pub firmware: Option<String>,
    /// Serial number.
    pub serial: Option<String>,
    /// Channel capacity when advertised.
    pub channel_capacity: Option<u32>,
}

/// One channel as reported by the NVR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Stable vendor channel reference.
    pub channel_ref: String,
    /// Channel display name.
    pub name: String,
    /// Whether the channel currently carries a signal.
    pub online: Option<bool>,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct PolledEvents {
    /// Events in occurrence order.
    pub events: Vec<RawNvrEvent>,
    /// Cursor resuming after the last event; `None` keeps the old cursor.
    pub next_cursor: Option<String>,
}

// ============================================================================
// SECTION: Adapter Interface
// ============================================================================

/// The vendor capability set.
pub trait NvrAdapter: Send + Sync {
    /// Verifies reachability and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the attempt.
    fn test_connection(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<(), DeviceError>;

    /// Fetches device identity.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the attempt.
    fn device_info(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<NvrDeviceInfo, DeviceError>;

    /// Lists the NVR's channels.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the attempt.
    fn list_channels(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<Vec<ChannelInfo>, DeviceError>;

    /// Polls events after the cursor position.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the attempt.
    fn poll_events(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        cursor: Option<&str>,
    ) -> Result<PolledEvents, DeviceError>;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Name-keyed adapter registry populated at startup.
#[derive(Default)]
pub struct AdapterRegistry {
    /// Registered adapters by vendor label.
    adapters: BTreeMap<&'static str, Arc<dyn NvrAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in vendor registered.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ClientInit`] when an adapter's HTTP client
    /// cannot be constructed.
    pub fn with_builtin() -> Result<Self, DeviceError> {
        let mut registry = Self::new();
        registry.register(NvrVendor::Hikvision.as_str(), hikvision::HikvisionAdapter::new()?);
        registry.register(NvrVendor::Dahua.as_str(), dahua::DahuaAdapter::new()?);
        registry.register(NvrVendor::Onvif.as_str(), onvif::OnvifNvrAdapter::new());
        Ok(registry)
    }

    /// Registers an adapter under a vendor label.
    pub fn register(&mut self, vendor: &'static str, adapter: impl NvrAdapter + 'static) {
        self.adapters.insert(vendor, Arc::new(adapter));
    }

    /// Resolves an adapter by vendor.
    #[must_use]
    pub fn resolve(&self, vendor: NvrVendor) -> Option<Arc<dyn NvrAdapter>> {
        self.adapters.get(vendor.as_str()).map(Arc::clone)
    }

    /// Returns the registered vendor labels.
    #[must_use]
    pub fn vendors(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn builtin_registry_covers_every_vendor() {
        let registry = AdapterRegistry::with_builtin().unwrap();
        for vendor in [NvrVendor::Hikvision, NvrVendor::Dahua, NvrVendor::Onvif] {
            assert!(registry.resolve(vendor).is_some(), "missing {}", vendor.as_str());
        }
        assert_eq!(registry.vendors(), vec!["dahua", "hikvision", "onvif"]);
    }

    #[test]
    fn endpoint_base_url_follows_scheme() {
        let endpoint = NvrEndpoint {
            host: "10.0.0.9".to_string(),
            port: 443,
            https: true,
        };
        assert_eq!(endpoint.base_url(), "https://10.0.0.9:443");
    }
}
