// crates/vigil-devices/src/lib.rs
// ============================================================================
// Module: Vigil Devices Library
// Description: Device discovery, probing, and vendor NVR adapters.
// Purpose: Give the control plane one surface for all device I/O.
// Dependencies: crate::{adapters, error, onvif, rtsp, uri, wsdiscovery, xml}
// ============================================================================

//! ## Overview
//! Everything that talks to a camera or recorder lives here: the
//! WS-Discovery multicast scan, the WS-Security SOAP client, the RTSP
//! health probe, and the vendor adapter registry. All returned URIs pass
//! through credential stripping; all failures classify into coarse codes
//! the stores persist.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod adapters;
pub mod error;
pub mod onvif;
pub mod rtsp;
pub mod uri;
pub mod wsdiscovery;
pub mod xml;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use adapters::AdapterRegistry;
pub use adapters::ChannelInfo;
pub use adapters::NvrAdapter;
pub use adapters::NvrDeviceInfo;
pub use adapters::NvrEndpoint;
pub use adapters::PolledEvents;
pub use error::DeviceError;
pub use onvif::OnvifClient;
pub use onvif::OnvifDeviceInfo;
pub use onvif::OnvifProfile;
pub use onvif::PROBE_BUDGET;
pub use onvif::ProbeReport;
pub use onvif::SOAP_CALL_TIMEOUT;
pub use rtsp::RTSP_PROBE_TIMEOUT;
pub use rtsp::RtspProbeOutcome;
pub use uri::has_no_userinfo;
pub use uri::strip_credentials;
pub use wsdiscovery::DISCOVERY_TIMEOUT;
pub use wsdiscovery::MAX_DEVICES_PER_RUN;
pub use wsdiscovery::ProbeHit;
pub use wsdiscovery::discover;
pub use wsdiscovery::parse_probe_matches;
