// crates/vigil-media/src/client.rs
// ============================================================================
// Module: Media Plane Client
// Description: Bounded JSON-over-HTTP RPC client for the media plane.
// Purpose: Start/stop ingest and SFU egress without blocking the control
//          plane on media failures.
// Dependencies: reqwest, serde, vigil-core
// ============================================================================

//! ## Overview
//! The media plane is an external collaborator reached over a small JSON
//! RPC surface. Every call carries a hard deadline and maps the plane's
//! error strings onto a closed kind set, so control-plane code never
//! string-matches a vendor message. Media unavailability surfaces as a
//! typed error the API layer can degrade around.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use vigil_core::CameraId;
use vigil_core::ErrorKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard deadline for every media-plane call.
pub const MEDIA_CALL_DEADLINE: Duration = Duration::from_secs(10);

/// Stall threshold while an ingest is RUNNING.
pub const STALL_THRESHOLD_RUNNING: Duration = Duration::from_secs(5);

/// Stall threshold while an ingest is STARTING.
pub const STALL_THRESHOLD_STARTING: Duration = Duration::from_secs(90);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Closed error kinds for media-plane failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorKind {
    /// The referenced ingest or egress does not exist.
    NotFound,
    /// The plane is out of pipeline capacity.
    ResourceExhausted,
    /// The requested pipeline is already running.
    AlreadyRunning,
    /// Anything else, including transport failures.
    Internal,
}

/// A media-plane call failure.
#[derive(Debug, Clone, Error)]
#[error("media plane {kind:?}: {message}")]
pub struct MediaError {
    /// Classified kind.
    pub kind: MediaErrorKind,
    /// Plane-reported or transport message.
    pub message: String,
}

impl MediaError {
    /// Maps the failure onto the control plane's closed taxonomy.
    #[must_use]
    pub const fn core_kind(&self) -> ErrorKind {
        match self.kind {
            MediaErrorKind::NotFound => ErrorKind::NotFound,
            MediaErrorKind::ResourceExhausted => ErrorKind::RateLimited,
            MediaErrorKind::AlreadyRunning => ErrorKind::Conflict,
            MediaErrorKind::Internal => ErrorKind::TransientExternal,
        }
    }
}

/// Classifies a plane error string into a kind.
fn classify(code: &str) -> MediaErrorKind {
    match code {
        "not_found" => MediaErrorKind::NotFound,
        "resource_exhausted" => MediaErrorKind::ResourceExhausted,
        "already_running" => MediaErrorKind::AlreadyRunning,
        _ => MediaErrorKind::Internal,
    }
}

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Ingest status as reported by the plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStatus {
    /// Subject camera.
    pub camera_id: CameraId,
    /// Pipeline state label (`STARTING`, `RUNNING`, `STOPPED`).
    pub state: String,
    /// Seconds since the last media packet, when known.
    pub last_packet_age_secs: Option<u64>,
    /// Whether the plane considers the pipeline stalled.
    pub stalled: bool,
}

/// Error envelope returned by the plane.
#[derive(Debug, Deserialize)]
struct PlaneError {
    /// Machine-readable error code.
    error: String,
    /// Human-readable message.
    #[serde(default)]
    message: String,
}

/// Request body for `start_ingest`.
#[derive(Debug, Serialize)]
struct StartIngestRequest<'a> {
    /// Subject camera.
    camera_id: CameraId,
    /// Source RTSP URL (credentials already stripped upstream; the plane
    /// resolves credentials itself).
    rtsp_url: &'a str,
    /// Force RTP-over-TCP interleaving.
    prefer_tcp: bool,
}

/// Request body for `start_sfu_rtp_egress`.
#[derive(Debug, Serialize)]
struct StartEgressRequest<'a> {
    /// Subject camera.
    camera_id: CameraId,
    /// Destination RTP address.
    dst_ip: &'a str,
    /// Destination RTP port.
    port: u16,
    /// RTP synchronization source.
    ssrc: u32,
    /// RTP payload type.
    payload_type: u8,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Bounded media-plane RPC client.
pub struct MediaClient {
    /// Plane base URL.
    base_url: String,
    /// Blocking HTTP client with the deadline applied.
    http: reqwest::blocking::Client,
}

impl MediaClient {
    /// Builds a client for the plane's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] when the HTTP client cannot build.
    pub fn new(base_url: &str) -> Result<Self, MediaError> {
        Self::with_deadline(base_url, MEDIA_CALL_DEADLINE)
    }

    /// Builds a client with an explicit deadline (tests shorten it).
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] when the HTTP client cannot build.
    pub fn with_deadline(base_url: &str, deadline: Duration) -> Result<Self, MediaError> {
        let http = reqwest::blocking::Client::builder().timeout(deadline).build().map_err(
            |err| MediaError {
                kind: MediaErrorKind::Internal,
                message: err.to_string(),
            },
        )?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Starts an RTSP ingest for a camera.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn start_ingest(
        &self,
        camera_id: CameraId,
        rtsp_url: &str,
        prefer_tcp: bool,
    ) -> Result<IngestStatus, MediaError> {
        self.post_json(
            "/v1/ingests",
            &StartIngestRequest {
                camera_id,
                rtsp_url,
                prefer_tcp,
            },
        )
    }

    /// Stops a camera's ingest.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn stop_ingest(&self, camera_id: CameraId) -> Result<(), MediaError> {
        self.delete(&format!("/v1/ingests/{camera_id}"))
    }

    /// Fetches a camera's ingest status.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn get_status(&self, camera_id: CameraId) -> Result<IngestStatus, MediaError> {
        self.get_json(&format!("/v1/ingests/{camera_id}"))
    }

    /// Lists every active ingest.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn list_ingests(&self) -> Result<Vec<IngestStatus>, MediaError> {
        self.get_json("/v1/ingests")
    }

    /// Captures a JPEG snapshot for a camera.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn capture_snapshot(&self, camera_id: CameraId) -> Result<Vec<u8>, MediaError> {
        let url = format!("{}/v1/ingests/{camera_id}/snapshot", self.base_url);
        let response = self.http.get(url).send().map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(decode_error(status, response));
        }
        response.bytes().map(|bytes| bytes.to_vec()).map_err(|err| transport_error(err))
    }

    /// Starts RTP egress toward an SFU consumer transport.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn start_sfu_rtp_egress(
        &self,
        camera_id: CameraId,
        dst_ip: &str,
        port: u16,
        ssrc: u32,
        payload_type: u8,
    ) -> Result<(), MediaError> {
        let _: serde_json::Value = self.post_json(
            "/v1/egress/sfu",
            &StartEgressRequest {
                camera_id,
                dst_ip,
                port,
                ssrc,
                payload_type,
            },
        )?;
        Ok(())
    }

    /// Stops a camera's SFU egress.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] classified from the plane's answer.
    pub fn stop_sfu_rtp_egress(&self, camera_id: CameraId) -> Result<(), MediaError> {
        self.delete(&format!("/v1/egress/sfu/{camera_id}"))
    }

    /// POSTs a JSON body and decodes a JSON answer.
    fn post_json<Req: Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, MediaError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(url).json(request).send().map_err(transport_error)?;
        decode_json(response)
    }

    /// GETs a JSON answer.
    fn get_json<Resp: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Resp, MediaError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(url).send().map_err(transport_error)?;
        decode_json(response)
    }

    /// Issues a DELETE expecting an empty success.
    fn delete(&self, path: &str) -> Result<(), MediaError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.delete(url).send().map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(decode_error(status, response))
    }
}

/// Maps a transport failure into the internal kind.
fn transport_error(err: reqwest::Error) -> MediaError {
    MediaError {
        kind: MediaErrorKind::Internal,
        message: err.to_string(),
    }
}

/// Decodes a success JSON body or classifies the error envelope.
fn decode_json<Resp: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<Resp, MediaError> {
    let status = response.status();
    if !status.is_success() {
        return Err(decode_error(status, response));
    }
    response.json().map_err(transport_error)
}

/// Classifies a non-success response into a typed error.
fn decode_error(
    status: reqwest::StatusCode,
    response: reqwest::blocking::Response,
) -> MediaError {
    match response.json::<PlaneError>() {
        Ok(plane) => MediaError {
            kind: classify(&plane.error),
            message: if plane.message.is_empty() {
                plane.error
            } else {
                plane.message
            },
        },
        Err(_) => MediaError {
            kind: MediaErrorKind::Internal,
            message: format!("media plane status {status}"),
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn classifies_known_codes() {
        assert_eq!(classify("not_found"), MediaErrorKind::NotFound);
        assert_eq!(classify("resource_exhausted"), MediaErrorKind::ResourceExhausted);
        assert_eq!(classify("already_running"), MediaErrorKind::AlreadyRunning);
        assert_eq!(classify("gstreamer_exploded"), MediaErrorKind::Internal);
    }

    #[test]
    fn kinds_map_onto_core_taxonomy() {
        let err = MediaError {
            kind: MediaErrorKind::AlreadyRunning,
            message: String::new(),
        };
        assert_eq!(err.core_kind(), ErrorKind::Conflict);
    }
}
