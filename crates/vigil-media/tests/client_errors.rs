// crates/vigil-media/tests/client_errors.rs
// ============================================================================
// Module: Media Client Tests
// Description: Exercise the client against a stub media plane.
// Purpose: Pin error classification and the happy-path decode.
// Dependencies: vigil-media, tiny_http
// ============================================================================

//! Media client tests against a local stub server.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test setup uses unwraps for clarity."
)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use vigil_core::CameraId;
use vigil_media::MediaClient;
use vigil_media::MediaErrorKind;

/// Starts a stub server answering every request with one canned body.
fn stub_server(status: u16, body: &'static str) -> (Arc<Server>, String) {
    let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
    let port = server.server_addr().to_ip().unwrap().port();
    let handle = Arc::clone(&server);
    thread::spawn(move || {
        while let Ok(request) = handle.recv() {
            let header = Header::from_bytes("Content-Type", "application/json").unwrap();
            let response =
                Response::from_string(body).with_status_code(status).with_header(header);
            let _ = request.respond(response);
        }
    });
    (server, format!("http://127.0.0.1:{port}"))
}

#[test]
fn decodes_ingest_status() {
    let camera = CameraId::generate();
    let body = format!(
        r#"{{"camera_id":"{camera}","state":"RUNNING","last_packet_age_secs":1,"stalled":false}}"#
    );
    let (server, url) = stub_server(200, Box::leak(body.into_boxed_str()));
    let client = MediaClient::with_deadline(&url, Duration::from_secs(2)).unwrap();
    let status = client.get_status(camera).unwrap();
    assert_eq!(status.camera_id, camera);
    assert_eq!(status.state, "RUNNING");
    assert!(!status.stalled);
    drop(server);
}

#[test]
fn classifies_already_running() {
    let (server, url) =
        stub_server(409, r#"{"error":"already_running","message":"pipeline exists"}"#);
    let client = MediaClient::with_deadline(&url, Duration::from_secs(2)).unwrap();
    let err = client
        .start_ingest(CameraId::generate(), "rtsp://10.0.0.5/stream", true)
        .unwrap_err();
    assert_eq!(err.kind, MediaErrorKind::AlreadyRunning);
    assert_eq!(err.message, "pipeline exists");
    drop(server);
}

#[test]
fn classifies_not_found_on_stop() {
    let (server, url) = stub_server(404, r#"{"error":"not_found"}"#);
    let client = MediaClient::with_deadline(&url, Duration::from_secs(2)).unwrap();
    let err = client.stop_ingest(CameraId::generate()).unwrap_err();
    assert_eq!(err.kind, MediaErrorKind::NotFound);
    drop(server);
}

#[test]
fn unparseable_error_body_is_internal() {
    let (server, url) = stub_server(500, "gstreamer pipeline panicked");
    let client = MediaClient::with_deadline(&url, Duration::from_secs(2)).unwrap();
    let err = client.list_ingests().unwrap_err();
    assert_eq!(err.kind, MediaErrorKind::Internal);
    drop(server);
}

#[test]
fn unreachable_plane_is_internal() {
    // Nothing listens on this port.
    let client =
        MediaClient::with_deadline("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
    let err = client.list_ingests().unwrap_err();
    assert_eq!(err.kind, MediaErrorKind::Internal);
}
