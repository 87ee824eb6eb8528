// crates/vigil-devices/src/adapters/dahua.rs
// ============================================================================
// Module: Dahua Adapter
// Description: CGI-based implementation of the NVR capability set.
// Purpose: Talk to Dahua recorders over their key=value HTTP API.
// Dependencies: reqwest, time
// ============================================================================

//! ## Overview
//! Dahua answers CGI endpoints with `key=value` lines. Identity comes from
//! `magicBox.cgi`, channel titles from `configManager.cgi`, and events from
//! the alarm channel snapshot at `eventManager.cgi`. The event surface has
//! no server-side cursor, so the poll cursor is a client-side minute bucket
//! that keeps one snapshot from repeating inside a cycle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
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

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Per-call HTTP timeout.
const CALL_TIMEOUT: Duration = Duration::from_secs(4);

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Dahua CGI adapter.
pub struct DahuaAdapter {
    /// Blocking HTTP client with the call timeout applied.
    http: reqwest::blocking::Client,
}

impl DahuaAdapter {
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
        path_and_query: &str,
    ) -> Result<String, DeviceError> {
        let response = self
            .http
            .get(format!("{}{path_and_query}", endpoint.base_url()))
            .basic_auth(&credential.username, Some(&credential.password))
            .send()
            .map_err(|err| classify_http_error(&err))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DeviceError::Unauthorized);
        }
        if !status.is_success() {
            return Err(DeviceError::Protocol(format!("http status {status}")));
        }
        response.text().map_err(|err| classify_http_error(&err))
    }
}

impl NvrAdapter for DahuaAdapter {
    fn test_connection(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<(), DeviceError> {
        self.get(endpoint, credential, "/cgi-bin/magicBox.cgi?action=getDeviceType").map(|_| ())
    }

    fn device_info(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<NvrDeviceInfo, DeviceError> {
        let body = self.get(endpoint, credential, "/cgi-bin/magicBox.cgi?action=getSystemInfo")?;
        let fields = parse_kv(&body);
        Ok(NvrDeviceInfo {
            model: fields.get("deviceType").cloned(),
            firmware: fields.get("version").cloned(),
            serial: fields.get("serialNumber").cloned(),
            channel_capacity: None,
        })
    }

    fn list_channels(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<Vec<ChannelInfo>, DeviceError> {
        let body = self.get(
            endpoint,
            credential,
            "/cgi-bin/configManager.cgi?action=getConfig&name=ChannelTitle",
        )?;
        Ok(parse_channel_titles(&body))
    }

    fn poll_events(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        cursor: Option<&str>,
    ) -> Result<PolledEvents, DeviceError> {
        let body = self.get(
            endpoint,
            credential,
            "/cgi-bin/eventManager.cgi?action=getEventIndexes&code=VideoMotion",
        )?;
        let now = OffsetDateTime::now_utc();
        Ok(snapshot_events(&body, cursor, now))
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses Dahua `key=value` lines, keeping the last value per key.
#[must_use]
pub fn parse_kv(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parses `ChannelTitle` config lines into channels.
///
/// Lines look like `table.ChannelTitle[3].Name=Dock West`.
#[must_use]
fn parse_channel_titles(body: &str) -> Vec<ChannelInfo> {
    let mut channels = Vec::new();
    for (key, value) in parse_kv(body) {
        let Some(rest) = key.strip_prefix("table.ChannelTitle[") else {
            continue;
        };
        let Some((index, field)) = rest.split_once(']') else {
            continue;
        };
        if field != ".Name" {
            continue;
        }
        channels.push(ChannelInfo {
            channel_ref: index.to_string(),
            name: value,
            online: None,
        });
    }
    channels.sort_by(|a, b| {
        let left: u32 = a.channel_ref.parse().unwrap_or(u32::MAX);
        let right: u32 = b.channel_ref.parse().unwrap_or(u32::MAX);
        left.cmp(&right)
    });
    channels
}

/// Builds events from the current motion-index snapshot.
///
/// The cursor is the minute bucket of the last snapshot; identical buckets
/// produce identical stable keys so the dedup window collapses repeats.
#[must_use]
fn snapshot_events(body: &str, cursor: Option<&str>, now: OffsetDateTime) -> PolledEvents {
    let bucket = now.unix_timestamp() / 60;
    let bucket_label = bucket.to_string();
    if cursor == Some(bucket_label.as_str()) {
        return PolledEvents {
            events: Vec::new(),
            next_cursor: Some(bucket_label),
        };
    }
    let mut events = Vec::new();
    for (key, value) in parse_kv(body) {
        if !key.starts_with("channels[") {
            continue;
        }
        let occurred_at = now;
        events.push(RawNvrEvent {
            stable_key: format!("{value}:motion:{bucket}"),
            event_type: "motion".to_string(),
            channel_ref: Some(value.clone()),
            occurred_at,
            payload: serde_json::json!({
                "code": "VideoMotion",
                "observed_at": occurred_at.format(&Rfc3339).ok(),
            }),
        });
    }
    PolledEvents {
        events,
        next_cursor: Some(bucket_label),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let body = "deviceType=DHI-NVR5216\r\nversion=4.001.0000000.1\r\nserialNumber=ABC123\r\n";
        let fields = parse_kv(body);
        assert_eq!(fields.get("deviceType").map(String::as_str), Some("DHI-NVR5216"));
        assert_eq!(fields.get("serialNumber").map(String::as_str), Some("ABC123"));
    }

    #[test]
    fn parses_channel_titles_in_index_order() {
        let body = "table.ChannelTitle[1].Name=Dock\r\ntable.ChannelTitle[0].Name=Lobby\r\n\
                    table.ChannelTitle[0].Other=x\r\n";
        let channels = parse_channel_titles(body);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_ref, "0");
        assert_eq!(channels[0].name, "Lobby");
        assert_eq!(channels[1].channel_ref, "1");
    }

    #[test]
    fn snapshot_dedups_within_a_minute_bucket() {
        let body = "channels[0]=2\r\nchannels[1]=5\r\n";
        let now = OffsetDateTime::from_unix_timestamp(1_750_000_020).unwrap();
        let first = snapshot_events(body, None, now);
        assert_eq!(first.events.len(), 2);
        let cursor = first.next_cursor.clone();
        let second = snapshot_events(body, cursor.as_deref(), now);
        assert!(second.events.is_empty());
    }
}
