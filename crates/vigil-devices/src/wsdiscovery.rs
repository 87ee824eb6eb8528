// crates/vigil-devices/src/wsdiscovery.rs
// ============================================================================
// Module: WS-Discovery
// Description: Multicast probe and ProbeMatch parsing.
// Purpose: Find ONVIF devices on the local segment within a bounded scan.
// Dependencies: quick-xml, uuid
// ============================================================================

//! ## Overview
//! One SOAP `Probe` goes out on the WS-Discovery multicast group; devices
//! answer with `ProbeMatch` payloads carrying their service addresses and
//! scope hints. The scan is bounded both in time and in accepted device
//! count, and parsing tolerates the namespace soup real devices produce.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::UdpSocket;
use std::time::Duration;
use std::time::Instant;

use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;
use uuid::Uuid;

use crate::error::DeviceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// WS-Discovery multicast group and port.
pub const MULTICAST_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(239, 255, 255, 250), 3702);

/// Overall scan timeout.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum devices accepted per run.
pub const MAX_DEVICES_PER_RUN: usize = 4096;

// ============================================================================
// SECTION: Probe Hits
// ============================================================================

/// One device answer from the multicast probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeHit {
    /// Advertised service addresses.
    pub xaddrs: Vec<String>,
    /// Advertised scope URIs.
    pub scopes: Vec<String>,
}

impl ProbeHit {
    /// Extracts the IPv4 address from the first http(s) XAddr.
    #[must_use]
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.xaddrs
            .iter()
            .filter(|xaddr| xaddr.starts_with("http://") || xaddr.starts_with("https://"))
            .find_map(|xaddr| {
                let url = Url::parse(xaddr).ok()?;
                url.host_str()?.parse().ok()
            })
    }

    /// Returns `(profile_s, profile_t, profile_g)` hints from the scopes.
    #[must_use]
    pub fn profile_hints(&self) -> (bool, bool, bool) {
        let mut hints = (false, false, false);
        for scope in &self.scopes {
            let scope = scope.to_ascii_lowercase();
            if scope.ends_with("/profile/s") || scope.ends_with("/profile/streaming") {
                hints.0 = true;
            }
            if scope.ends_with("/profile/t") {
                hints.1 = true;
            }
            if scope.ends_with("/profile/g") {
                hints.2 = true;
            }
        }
        hints
    }
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Renders the WS-Discovery probe envelope with a fresh message id.
#[must_use]
pub fn probe_envelope() -> String {
    let message_id = Uuid::new_v4();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"
            xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <e:Header>
    <w:MessageID>uuid:{message_id}</w:MessageID>
    <w:To e:mustUnderstand="true">urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>
    <w:Action e:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>
  </e:Header>
  <e:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </e:Body>
</e:Envelope>"#
    )
}

/// Runs a bounded multicast scan and returns the parsed answers.
///
/// # Errors
///
/// Returns [`DeviceError::Io`] when the socket cannot be created; receive
/// timeouts inside the window are not errors.
pub fn discover(timeout: Duration, max_devices: usize) -> Result<Vec<ProbeHit>, DeviceError> {
    let socket =
        UdpSocket::bind(("0.0.0.0", 0)).map_err(|err| DeviceError::Io(err.to_string()))?;
    socket
        .set_read_timeout(Some(Duration::from_millis(250)))
        .map_err(|err| DeviceError::Io(err.to_string()))?;
    socket
        .send_to(probe_envelope().as_bytes(), MULTICAST_ADDR)
        .map_err(|err| DeviceError::Io(err.to_string()))?;

    let deadline = Instant::now() + timeout;
    let mut hits = Vec::new();
    let mut buffer = vec![0_u8; 64 * 1024];
    while Instant::now() < deadline && hits.len() < max_devices {
        let received = match socket.recv_from(&mut buffer) {
            Ok((len, _peer)) => len,
            // Timeouts just mean no answer this interval.
            Err(_) => continue,
        };
        let Ok(xml) = std::str::from_utf8(&buffer[..received]) else {
            continue;
        };
        if let Ok(parsed) = parse_probe_matches(xml) {
            for hit in parsed {
                if hits.len() >= max_devices {
                    break;
                }
                if !hits.contains(&hit) {
                    hits.push(hit);
                }
            }
        }
    }
    Ok(hits)
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses every `ProbeMatch` out of a WS-Discovery answer.
///
/// # Errors
///
/// Returns [`DeviceError::Protocol`] on malformed XML.
pub fn parse_probe_matches(xml: &str) -> Result<Vec<ProbeHit>, DeviceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut hits = Vec::new();
    let mut current: Option<ProbeHit> = None;
    let mut field: Option<&'static str> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"ProbeMatch" => current = Some(ProbeHit::default()),
                b"XAddrs" => field = Some("xaddrs"),
                b"Scopes" => field = Some("scopes"),
                _ => field = None,
            },
            Ok(Event::End(end)) => {
                if end.local_name().as_ref() == b"ProbeMatch" {
                    if let Some(hit) = current.take() {
                        hits.push(hit);
                    }
                }
                field = None;
            }
            Ok(Event::Text(text)) => {
                if let (Some(hit), Some(field)) = (current.as_mut(), field) {
                    let value = text
                        .unescape()
                        .map_err(|err| DeviceError::Protocol(err.to_string()))?;
                    let values = value.split_whitespace().map(str::to_string);
                    match field {
                        "xaddrs" => hit.xaddrs.extend(values),
                        _ => hit.scopes.extend(values),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(DeviceError::Protocol(err.to_string())),
        }
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    const SAMPLE_ANSWER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope"
                   xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery">
  <SOAP-ENV:Body>
    <d:ProbeMatches>
      <d:ProbeMatch>
        <d:Scopes>onvif://www.onvif.org/Profile/Streaming onvif://www.onvif.org/Profile/T onvif://www.onvif.org/name/Lobby</d:Scopes>
        <d:XAddrs>http://192.168.1.64/onvif/device_service http://[fe80::1]/onvif/device_service</d:XAddrs>
      </d:ProbeMatch>
      <d:ProbeMatch>
        <d:Scopes>onvif://www.onvif.org/Profile/G</d:Scopes>
        <d:XAddrs>http://192.168.1.65:8080/onvif/device_service</d:XAddrs>
      </d:ProbeMatch>
    </d:ProbeMatches>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn parses_probe_matches_with_namespaces() {
        let hits = parse_probe_matches(SAMPLE_ANSWER).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].xaddrs.len(), 2);
        assert_eq!(hits[1].xaddrs.len(), 1);
    }

    #[test]
    fn extracts_ipv4_from_first_http_xaddr() {
        let hits = parse_probe_matches(SAMPLE_ANSWER).unwrap();
        assert_eq!(hits[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 64)));
        assert_eq!(hits[1].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 65)));
    }

    #[test]
    fn profile_hints_follow_scopes() {
        let hits = parse_probe_matches(SAMPLE_ANSWER).unwrap();
        assert_eq!(hits[0].profile_hints(), (true, true, false));
        assert_eq!(hits[1].profile_hints(), (false, false, true));
    }

    #[test]
    fn probe_envelope_is_unique_per_call() {
        assert_ne!(probe_envelope(), probe_envelope());
    }
}
