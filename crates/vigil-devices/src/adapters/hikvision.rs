// crates/vigil-devices/src/adapters/hikvision.rs
// ============================================================================
// Module: Hikvision Adapter
// Description: ISAPI-based implementation of the NVR capability set.
// Purpose: Talk to Hikvision recorders over their XML HTTP API.
// Dependencies: quick-xml, reqwest, time
// ============================================================================

//! ## Overview
//! Hikvision exposes device identity at `/ISAPI/System/deviceInfo`, proxy
//! channels at `/ISAPI/ContentMgmt/InputProxy/channels`, and an event log
//! searchable by time window. The poll cursor is the RFC 3339 timestamp of
//! the last event seen; each cycle searches from the cursor forward.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use vigil_core::PlainCredential;
use vigil_core::RawNvrEvent;

use crate::adapters::ChannelInfo;
use crate::adapters::NvrAdapter;
use crate::adapters::NvrDeviceInfo;
use crate::adapters::NvrEndpoint;
use crate::adapters::PolledEvents;
use crate::error::DeviceError;
use crate::error::classify_http_error;
use crate::xml;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Per-call HTTP timeout.
const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Maximum events requested per poll.
const EVENTS_PER_POLL: usize = 100;

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Hikvision ISAPI adapter.
pub struct HikvisionAdapter {
    /// Blocking HTTP client with the call timeout applied.
    http: reqwest::blocking::Client,
}

impl HikvisionAdapter {
    /// Builds the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ClientInit`] when the client cannot build.
    pub fn new() -> Result<Self, DeviceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(CALL_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| DeviceError::ClientInit(err.to_string()))?;
        Ok(Self {
            http,
        })
    }

    /// Issues an authenticated GET, classifying failures.
    fn get(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        path: &str,
    ) -> Result<String, DeviceError> {
        let response = self
            .http
            .get(format!("{}{path}", endpoint.base_url()))
            .basic_auth(&credential.username, Some(&credential.password))
            .send()
            .map_err(|err| classify_http_error(&err))?;
        read_body(response)
    }

    /// Issues an authenticated POST with an XML body.
    fn post_xml(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        path: &str,
        body: String,
    ) -> Result<String, DeviceError> {
        let response = self
            .http
            .post(format!("{}{path}", endpoint.base_url()))
            .basic_auth(&credential.username, Some(&credential.password))
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .map_err(|err| classify_http_error(&err))?;
        read_body(response)
    }
}

/// Reads a response body, mapping auth and status failures.
fn read_body(response: reqwest::blocking::Response) -> Result<String, DeviceError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(DeviceError::Unauthorized);
    }
    if !status.is_success() {
        return Err(DeviceError::Protocol(format!("http status {status}")));
    }
    response.text().map_err(|err| classify_http_error(&err))
}

impl NvrAdapter for HikvisionAdapter {
    fn test_connection(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<(), DeviceError> {
        self.get(endpoint, credential, "/ISAPI/System/deviceInfo").map(|_| ())
    }

    fn device_info(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<NvrDeviceInfo, DeviceError> {
        let body = self.get(endpoint, credential, "/ISAPI/System/deviceInfo")?;
        parse_device_info(&body)
    }

    fn list_channels(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<Vec<ChannelInfo>, DeviceError> {
        let body = self.get(endpoint, credential, "/ISAPI/ContentMgmt/InputProxy/channels")?;
        parse_channels(&body)
    }

    fn poll_events(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        cursor: Option<&str>,
    ) -> Result<PolledEvents, DeviceError> {
        let since = cursor
            .and_then(|cursor| OffsetDateTime::parse(cursor, &Rfc3339).ok())
            .unwrap_or_else(|| OffsetDateTime::now_utc() - time::Duration::minutes(5));
        let body = search_body(since);
        let response =
            self.post_xml(endpoint, credential, "/ISAPI/ContentMgmt/logSearch", body)?;
        parse_events(&response, since)
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Renders the log-search request body from the cursor time.
fn search_body(since: OffsetDateTime) -> String {
    let start = since.format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CMSearchDescription>
  <searchID>vigil-poll</searchID>
  <metaId>log.std-cgi.com</metaId>
  <timeSpanList>
    <timeSpan>
      <startTime>{start}</startTime>
      <endTime>2038-01-01T00:00:00Z</endTime>
    </timeSpan>
  </timeSpanList>
  <maxResults>{EVENTS_PER_POLL}</maxResults>
</CMSearchDescription>"#
    )
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses `/ISAPI/System/deviceInfo`.
fn parse_device_info(body: &str) -> Result<NvrDeviceInfo, DeviceError> {
    Ok(NvrDeviceInfo {
        model: xml::first_text(body, "model")?,
        firmware: xml::first_text(body, "firmwareVersion")?,
        serial: xml::first_text(body, "serialNumber")?,
        channel_capacity: xml::first_text(body, "videoInputPortNums")?
            .and_then(|value| value.parse().ok()),
    })
}

/// Parses the input-proxy channel list.
fn parse_channels(body: &str) -> Result<Vec<ChannelInfo>, DeviceError> {
    let ids = xml::all_texts(body, "id")?;
    let names = xml::all_texts(body, "name")?;
    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(index, id)| ChannelInfo {
            channel_ref: id,
            name: names.get(index).cloned().unwrap_or_default(),
            online: None,
        })
        .collect())
}

/// Parses log-search matches into raw events, advancing the cursor.
fn parse_events(body: &str, since: OffsetDateTime) -> Result<PolledEvents, DeviceError> {
    let times = xml::all_texts(body, "logTime")?;
    let types = xml::all_texts(body, "majorType")?;
    let details = xml::all_texts(body, "minorType")?;
    let channels = xml::all_texts(body, "channelID")?;

    let mut events = Vec::new();
    let mut newest = since;
    for (index, time_text) in times.iter().enumerate() {
        let Ok(occurred_at) = OffsetDateTime::parse(time_text, &Rfc3339) else {
            continue;
        };
        if occurred_at <= since {
            continue;
        }
        let major = types.get(index).cloned().unwrap_or_else(|| "event".to_string());
        let minor = details.get(index).cloned().unwrap_or_default();
        let channel_ref = channels.get(index).cloned();
        let event_type = normalize_event_type(&major, &minor);
        events.push(RawNvrEvent {
            stable_key: format!(
                "{}:{}:{}",
                channel_ref.as_deref().unwrap_or("0"),
                event_type,
                time_text
            ),
            event_type,
            channel_ref,
            occurred_at,
            payload: serde_json::json!({
                "major_type": major,
                "minor_type": minor,
            }),
        });
        if occurred_at > newest {
            newest = occurred_at;
        }
    }
    let next_cursor = (!events.is_empty())
        .then(|| newest.format(&Rfc3339).ok())
        .flatten();
    Ok(PolledEvents {
        events,
        next_cursor,
    })
}

/// Folds vendor major/minor labels into the vendor-agnostic type set.
fn normalize_event_type(major: &str, minor: &str) -> String {
    let combined = format!("{major}/{minor}").to_ascii_lowercase();
    if combined.contains("motion") {
        "motion".to_string()
    } else if combined.contains("videoloss") || combined.contains("video loss") {
        "video_loss".to_string()
    } else if combined.contains("tamper") {
        "tamper".to_string()
    } else if combined.contains("disk") || combined.contains("hdd") {
        "storage".to_string()
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn parses_device_info() {
        let body = r#"<DeviceInfo>
          <deviceName>NVR-East</deviceName>
          <model>DS-7608NI</model>
          <serialNumber>0820230405</serialNumber>
          <firmwareVersion>V4.62.210</firmwareVersion>
          <videoInputPortNums>8</videoInputPortNums>
        </DeviceInfo>"#;
        let info = parse_device_info(body).unwrap();
        assert_eq!(info.model.as_deref(), Some("DS-7608NI"));
        assert_eq!(info.channel_capacity, Some(8));
    }

    #[test]
    fn parses_channels_pairing_ids_and_names() {
        let body = r#"<InputProxyChannelList>
          <InputProxyChannel><id>101</id><name>Lobby</name></InputProxyChannel>
          <InputProxyChannel><id>102</id><name>Dock</name></InputProxyChannel>
        </InputProxyChannelList>"#;
        let channels = parse_channels(body).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_ref, "101");
        assert_eq!(channels[1].name, "Dock");
    }

    #[test]
    fn poll_skips_events_at_or_before_cursor_and_advances() {
        let since = OffsetDateTime::parse("2026-03-01T10:00:00Z", &Rfc3339).unwrap();
        let body = r#"<CMSearchResult>
          <matchList>
            <searchMatchItem>
              <logTime>2026-03-01T10:00:00Z</logTime>
              <majorType>Alarm</majorType><minorType>Motion Detection Started</minorType>
              <channelID>101</channelID>
            </searchMatchItem>
            <searchMatchItem>
              <logTime>2026-03-01T10:05:00Z</logTime>
              <majorType>Alarm</majorType><minorType>Motion Detection Started</minorType>
              <channelID>101</channelID>
            </searchMatchItem>
            <searchMatchItem>
              <logTime>2026-03-01T10:06:00Z</logTime>
              <majorType>Exception</majorType><minorType>VideoLoss</minorType>
              <channelID>102</channelID>
            </searchMatchItem>
          </matchList>
        </CMSearchResult>"#;
        let polled = parse_events(body, since).unwrap();
        assert_eq!(polled.events.len(), 2);
        assert_eq!(polled.events[0].event_type, "motion");
        assert_eq!(polled.events[1].event_type, "video_loss");
        assert_eq!(polled.next_cursor.as_deref(), Some("2026-03-01T10:06:00Z"));
    }

    #[test]
    fn stable_keys_encode_channel_type_and_time() {
        let since = OffsetDateTime::parse("2026-03-01T09:00:00Z", &Rfc3339).unwrap();
        let body = r#"<r><matchList><searchMatchItem>
            <logTime>2026-03-01T10:00:00Z</logTime>
            <majorType>Alarm</majorType><minorType>Motion</minorType>
            <channelID>7</channelID>
        </searchMatchItem></matchList></r>"#;
        let polled = parse_events(body, since).unwrap();
        assert_eq!(polled.events[0].stable_key, "7:motion:2026-03-01T10:00:00Z");
    }
}
