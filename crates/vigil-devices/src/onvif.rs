// crates/vigil-devices/src/onvif.rs
// ============================================================================
// Module: ONVIF SOAP Client
// Description: WS-Security-signed device management and media calls.
// Purpose: Probe devices for identity, capabilities, profiles, and URIs.
// Dependencies: base64, rand, reqwest, sha1, time
// ============================================================================

//! ## Overview
//! SOAP envelopes are assembled as literals and parsed namespace-agnostic,
//! which survives the prefix variation across vendors. Authentication uses
//! the WS-Security UsernameToken password digest
//! (`Base64(SHA1(nonce + created + password))`). Each call carries its own
//! short timeout; the full probe sequence runs under an overall budget and
//! strips credentials from every URI before returning it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::DeviceError;
use crate::error::classify_http_error;
use crate::uri::strip_credentials;
use crate::xml;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Per-call SOAP timeout.
pub const SOAP_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall budget for a full device probe.
pub const PROBE_BUDGET: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Device identity from `GetDeviceInformation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnvifDeviceInfo {
    /// Manufacturer name.
    pub manufacturer: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Firmware version.
    pub firmware: Option<String>,
    /// Serial number.
    pub serial: Option<String>,
}

/// One media profile from `GetProfiles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnvifProfile {
    /// Profile token.
    pub token: String,
    /// Profile display name.
    pub name: String,
    /// Video encoding label when advertised.
    pub encoding: Option<String>,
    /// Resolution as `WxH` when advertised.
    pub resolution: Option<String>,
}

/// The result of a full device probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Device identity.
    pub info: OnvifDeviceInfo,
    /// Media service address, when the device advertises one.
    pub media_xaddr: Option<String>,
    /// Media profiles.
    pub profiles: Vec<OnvifProfile>,
    /// Credential-stripped stream URI per profile token.
    pub stream_uris: Vec<(String, String)>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// A WS-Security SOAP client bound to one device endpoint.
pub struct OnvifClient {
    /// Device service endpoint.
    endpoint: String,
    /// Device username.
    username: String,
    /// Device password.
    password: String,
    /// Blocking HTTP client with the per-call timeout applied.
    http: reqwest::blocking::Client,
}

impl OnvifClient {
    /// Builds a client for a device endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ClientInit`] when the HTTP client cannot be
    /// constructed.
    pub fn new(endpoint: &str, username: &str, password: &str) -> Result<Self, DeviceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(SOAP_CALL_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| DeviceError::ClientInit(err.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    /// Issues one SOAP call and returns the raw response body.
    fn soap_call(&self, target: &str, body: &str) -> Result<String, DeviceError> {
        let envelope = build_envelope(&self.username, &self.password, body);
        let response = self
            .http
            .post(target)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope)
            .send()
            .map_err(|err| classify_http_error(&err))?;
        let status = response.status();
        let text = response.text().map_err(|err| classify_http_error(&err))?;
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DeviceError::Unauthorized);
        }
        // ONVIF auth failures often come back as SOAP faults with 400/500.
        if text.contains("NotAuthorized") || text.contains("Sender not authorized") {
            return Err(DeviceError::Unauthorized);
        }
        if !status.is_success() {
            return Err(DeviceError::Protocol(format!("soap status {status}")));
        }
        Ok(text)
    }

    /// Calls `GetDeviceInformation`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the call.
    pub fn get_device_information(&self) -> Result<OnvifDeviceInfo, DeviceError> {
        let body = r#"<tds:GetDeviceInformation xmlns:tds="http://www.onvif.org/ver10/device/wsdl"/>"#;
        let response = self.soap_call(&self.endpoint, body)?;
        Ok(OnvifDeviceInfo {
            manufacturer: xml::first_text(&response, "Manufacturer")?,
            model: xml::first_text(&response, "Model")?,
            firmware: xml::first_text(&response, "FirmwareVersion")?,
            serial: xml::first_text(&response, "SerialNumber")?,
        })
    }

    /// Calls `GetCapabilities`, extracting the media-service XAddr.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the call.
    pub fn get_capabilities(&self) -> Result<Option<String>, DeviceError> {
        let body = r#"<tds:GetCapabilities xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <tds:Category>Media</tds:Category>
</tds:GetCapabilities>"#;
        let response = self.soap_call(&self.endpoint, body)?;
        Ok(xml::all_texts(&response, "XAddr")?.into_iter().next())
    }

    /// Calls `GetProfiles` against the media service.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the call.
    pub fn get_profiles(&self, media_xaddr: &str) -> Result<Vec<OnvifProfile>, DeviceError> {
        let body = r#"<trt:GetProfiles xmlns:trt="http://www.onvif.org/ver10/media/wsdl"/>"#;
        let response = self.soap_call(media_xaddr, body)?;
        parse_profiles(&response)
    }

    /// Calls `GetStreamUri` for one profile and strips credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from the call.
    pub fn get_stream_uri(&self, media_xaddr: &str, token: &str) -> Result<String, DeviceError> {
        let body = format!(
            r#"<trt:GetStreamUri xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
                xmlns:tt="http://www.onvif.org/ver10/schema">
  <trt:StreamSetup>
    <tt:Stream>RTP-Unicast</tt:Stream>
    <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>
  </trt:StreamSetup>
  <trt:ProfileToken>{token}</trt:ProfileToken>
</trt:GetStreamUri>"#
        );
        let response = self.soap_call(media_xaddr, &body)?;
        let uri = xml::first_text(&response, "Uri")?
            .ok_or_else(|| DeviceError::Protocol("missing stream uri".to_string()))?;
        Ok(strip_credentials(&uri))
    }

    /// Opens a short-lived pull-point subscription and pulls once.
    ///
    /// Subscription references are not durable across restarts, so each
    /// cycle creates a fresh one and lets it expire on its own.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classified from either call.
    pub fn pull_messages(&self) -> Result<String, DeviceError> {
        let create = r#"<tev:CreatePullPointSubscription xmlns:tev="http://www.onvif.org/ver10/events/wsdl">
  <tev:InitialTerminationTime>PT60S</tev:InitialTerminationTime>
</tev:CreatePullPointSubscription>"#;
        let response = self.soap_call(&self.endpoint, create)?;
        let subscription =
            xml::first_text(&response, "Address")?.unwrap_or_else(|| self.endpoint.clone());
        let pull = r#"<tev:PullMessages xmlns:tev="http://www.onvif.org/ver10/events/wsdl">
  <tev:Timeout>PT1S</tev:Timeout>
  <tev:MessageLimit>100</tev:MessageLimit>
</tev:PullMessages>"#;
        self.soap_call(&subscription, pull)
    }

    /// Runs the full probe sequence under the overall budget.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] from the first failing call; partial results
    /// already gathered are discarded by the caller's classification.
    pub fn probe(&self) -> Result<ProbeReport, DeviceError> {
        let started = Instant::now();
        let info = self.get_device_information()?;
        check_budget(started)?;
        let media_xaddr = self.get_capabilities()?;
        let mut profiles = Vec::new();
        let mut stream_uris = Vec::new();
        if let Some(media_xaddr) = &media_xaddr {
            check_budget(started)?;
            profiles = self.get_profiles(media_xaddr)?;
            for profile in &profiles {
                check_budget(started)?;
                match self.get_stream_uri(media_xaddr, &profile.token) {
                    Ok(uri) => stream_uris.push((profile.token.clone(), uri)),
                    // A profile without a pullable URI is common; skip it.
                    Err(DeviceError::Protocol(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(ProbeReport {
            info,
            media_xaddr,
            profiles,
            stream_uris,
        })
    }
}

/// Fails the probe when the overall budget is exhausted.
fn check_budget(started: Instant) -> Result<(), DeviceError> {
    if started.elapsed() >= PROBE_BUDGET {
        return Err(DeviceError::Timeout("probe budget exhausted".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: WS-Security
// ============================================================================

/// Builds the WS-Security nonce, created timestamp, and password digest.
#[must_use]
fn security_token(password: &str, now: OffsetDateTime) -> (String, String, String) {
    let mut nonce = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let created = now.format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = BASE64.encode(hasher.finalize());
    (BASE64.encode(nonce), created, digest)
}

/// Wraps a body in a SOAP envelope with the security header.
#[must_use]
fn build_envelope(username: &str, password: &str, body: &str) -> String {
    let (nonce_b64, created, digest) = security_token(password, OffsetDateTime::now_utc());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" s:mustUnderstand="true">
      <UsernameToken>
        <Username>{username}</Username>
        <Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{digest}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{nonce_b64}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{created}</Created>
      </UsernameToken>
    </Security>
  </s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#
    )
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses profile tokens and hints out of a `GetProfilesResponse`.
fn parse_profiles(response: &str) -> Result<Vec<OnvifProfile>, DeviceError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(response);
    reader.config_mut().trim_text(true);
    let mut profiles: Vec<OnvifProfile> = Vec::new();
    let mut field: Option<&'static str> = None;
    let mut width: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"Profiles" => {
                    let token = start
                        .attributes()
                        .flatten()
                        .find(|attr| attr.key.local_name().as_ref() == b"token")
                        .and_then(|attr| attr.unescape_value().ok())
                        .map(|value| value.into_owned())
                        .unwrap_or_default();
                    profiles.push(OnvifProfile {
                        token,
                        name: String::new(),
                        encoding: None,
                        resolution: None,
                    });
                    width = None;
                }
                b"Name" if field.is_none() => field = Some("name"),
                b"Encoding" => field = Some("encoding"),
                b"Width" => field = Some("width"),
                b"Height" => field = Some("height"),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if let (Some(profile), Some(current)) = (profiles.last_mut(), field.take()) {
                    let value = text
                        .unescape()
                        .map_err(|err| DeviceError::Protocol(err.to_string()))?
                        .into_owned();
                    match current {
                        "name" => {
                            if profile.name.is_empty() {
                                profile.name = value;
                            }
                        }
                        "encoding" => profile.encoding = Some(value),
                        "width" => width = Some(value),
                        "height" => {
                            if let Some(width) = width.take() {
                                profile.resolution = Some(format!("{width}x{value}"));
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(DeviceError::Protocol(err.to_string())),
        }
    }
    Ok(profiles.into_iter().filter(|profile| !profile.token.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn envelope_carries_digest_not_password() {
        let envelope = build_envelope("svc", "swordfish", "<x/>");
        assert!(envelope.contains("<Username>svc</Username>"));
        assert!(!envelope.contains("swordfish"));
        assert!(envelope.contains("PasswordDigest"));
    }

    #[test]
    fn digest_changes_with_nonce() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let (_, _, first) = security_token("pw", now);
        let (_, _, second) = security_token("pw", now);
        assert_ne!(first, second);
    }

    #[test]
    fn parses_profiles_with_tokens_and_resolution() {
        let response = r#"<trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
          <trt:Profiles token="profile_1" fixed="true">
            <tt:Name>mainStream</tt:Name>
            <tt:VideoEncoderConfiguration token="venc_1">
              <tt:Name>venc</tt:Name>
              <tt:Encoding>H264</tt:Encoding>
              <tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution>
            </tt:VideoEncoderConfiguration>
          </trt:Profiles>
          <trt:Profiles token="profile_2">
            <tt:Name>subStream</tt:Name>
          </trt:Profiles>
        </trt:GetProfilesResponse>"#;
        let profiles = parse_profiles(response).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].token, "profile_1");
        assert_eq!(profiles[0].name, "mainStream");
        assert_eq!(profiles[0].encoding.as_deref(), Some("H264"));
        assert_eq!(profiles[0].resolution.as_deref(), Some("1920x1080"));
        assert_eq!(profiles[1].token, "profile_2");
    }
}
