// crates/vigil-devices/src/rtsp.rs
// ============================================================================
// Module: RTSP Probe
// Description: Short OPTIONS/DESCRIBE probe over a raw TCP connection.
// Purpose: Classify camera reachability for the health monitor.
// Dependencies: base64, url, vigil-core
// ============================================================================

//! ## Overview
//! The health probe needs only a coarse answer: does the device speak RTSP,
//! does it accept our credentials, and does it know the stream. A single
//! OPTIONS round-trip answers reachability; DESCRIBE with basic credentials
//! distinguishes auth failures from stream errors. No media ever flows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use url::Url;

use vigil_core::CameraHealthStatus;
use vigil_core::PlainCredential;

use crate::error::DeviceError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Probe connect and read timeout.
pub const RTSP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of one RTSP probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspProbeOutcome {
    /// Classified health status.
    pub status: CameraHealthStatus,
    /// Round-trip time in milliseconds.
    pub rtt_ms: u32,
    /// Coarse failure reason when not online.
    pub reason: Option<String>,
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Probes an RTSP endpoint, classifying the outcome.
///
/// # Errors
///
/// Returns [`DeviceError`] only for local faults (bad URL); remote failures
/// classify into the outcome instead.
pub fn probe(
    rtsp_url: &str,
    credential: Option<&PlainCredential>,
    timeout: Duration,
) -> Result<RtspProbeOutcome, DeviceError> {
    let url = Url::parse(rtsp_url).map_err(|err| DeviceError::Protocol(err.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| DeviceError::Protocol("rtsp url missing host".to_string()))?;
    let port = url.port().unwrap_or(554);
    let started = Instant::now();

    let address = (host, port)
        .to_socket_addrs()
        .map_err(|err| DeviceError::Io(err.to_string()))?
        .next()
        .ok_or_else(|| DeviceError::Io("rtsp host did not resolve".to_string()))?;
    let Ok(mut stream) = TcpStream::connect_timeout(&address, timeout) else {
        return Ok(RtspProbeOutcome {
            status: CameraHealthStatus::Offline,
            rtt_ms: elapsed_ms(started),
            reason: Some("connect_failed".to_string()),
        });
    };
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));

    let request = describe_request(rtsp_url, credential);
    if stream.write_all(request.as_bytes()).is_err() {
        return Ok(RtspProbeOutcome {
            status: CameraHealthStatus::Offline,
            rtt_ms: elapsed_ms(started),
            reason: Some("write_failed".to_string()),
        });
    }

    let mut response = vec![0_u8; 4096];
    let read = stream.read(&mut response).unwrap_or(0);
    let rtt_ms = elapsed_ms(started);
    if read == 0 {
        return Ok(RtspProbeOutcome {
            status: CameraHealthStatus::Offline,
            rtt_ms,
            reason: Some("no_response".to_string()),
        });
    }
    let header = String::from_utf8_lossy(&response[..read]);
    Ok(classify_response(&header, rtt_ms))
}

/// Builds the DESCRIBE request, attaching basic credentials when present.
#[must_use]
fn describe_request(rtsp_url: &str, credential: Option<&PlainCredential>) -> String {
    let mut request = format!(
        "DESCRIBE {rtsp_url} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: vigil-health\r\n\
         Accept: application/sdp\r\n"
    );
    if let Some(credential) = credential {
        let token = BASE64.encode(format!("{}:{}", credential.username, credential.password));
        request.push_str(&format!("Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Classifies the RTSP status line into a health status.
#[must_use]
fn classify_response(header: &str, rtt_ms: u32) -> RtspProbeOutcome {
    let status_line = header.lines().next().unwrap_or("");
    let code = status_line.split_whitespace().nth(1).unwrap_or("");
    match code {
        "200" => RtspProbeOutcome {
            status: CameraHealthStatus::Online,
            rtt_ms,
            reason: None,
        },
        "401" | "403" => RtspProbeOutcome {
            status: CameraHealthStatus::AuthFailed,
            rtt_ms,
            reason: Some("unauthorized".to_string()),
        },
        "404" | "454" => RtspProbeOutcome {
            status: CameraHealthStatus::StreamError,
            rtt_ms,
            reason: Some("stream_not_found".to_string()),
        },
        _ => RtspProbeOutcome {
            status: CameraHealthStatus::StreamError,
            rtt_ms,
            reason: Some(format!("rtsp_status_{code}")),
        },
    }
}

/// Milliseconds elapsed since the probe started, saturating.
fn elapsed_ms(started: Instant) -> u32 {
    u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn classifies_status_codes() {
        let ok = classify_response("RTSP/1.0 200 OK\r\nCSeq: 1\r\n", 12);
        assert_eq!(ok.status, CameraHealthStatus::Online);
        assert_eq!(ok.rtt_ms, 12);

        let auth = classify_response("RTSP/1.0 401 Unauthorized\r\n", 5);
        assert_eq!(auth.status, CameraHealthStatus::AuthFailed);

        let missing = classify_response("RTSP/1.0 454 Session Not Found\r\n", 5);
        assert_eq!(missing.status, CameraHealthStatus::StreamError);

        let garbage = classify_response("HTTP/1.1 302 Found\r\n", 5);
        assert_eq!(garbage.status, CameraHealthStatus::StreamError);
    }

    #[test]
    fn describe_request_includes_basic_credentials() {
        let credential = PlainCredential {
            username: "svc".to_string(),
            password: "pw".to_string(),
        };
        let request = describe_request("rtsp://10.0.0.5/stream", Some(&credential));
        assert!(request.starts_with("DESCRIBE rtsp://10.0.0.5/stream RTSP/1.0"));
        assert!(request.contains("Authorization: Basic "));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn bad_url_is_a_local_error() {
        assert!(probe("not-a-url", None, RTSP_PROBE_TIMEOUT).is_err());
    }
}
