// crates/vigil-devices/src/adapters/onvif.rs
// ============================================================================
// Module: ONVIF NVR Adapter
// Description: Generic ONVIF implementation of the NVR capability set.
// Purpose: Cover recorders with no vendor API via standard SOAP services.
// Dependencies: crate::onvif, time
// ============================================================================

//! ## Overview
//! The generic adapter leans on the SOAP client: identity from
//! `GetDeviceInformation`, channels from the media profile list, and events
//! from a short-lived pull-point subscription. Pull-point references are not
//! durable across control-plane restarts, so the poll cursor only carries
//! the last event time and each cycle opens a fresh subscription.

// ============================================================================
// SECTION: Imports
// ============================================================================

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
use crate::onvif::OnvifClient;
use crate::xml;

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Generic ONVIF adapter.
#[derive(Default)]
pub struct OnvifNvrAdapter;

impl OnvifNvrAdapter {
    /// Builds the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds a SOAP client for the endpoint's device service.
    fn client(
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<OnvifClient, DeviceError> {
        let service = format!("{}/onvif/device_service", endpoint.base_url());
        OnvifClient::new(&service, &credential.username, &credential.password)
    }
}

impl NvrAdapter for OnvifNvrAdapter {
    fn test_connection(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<(), DeviceError> {
        Self::client(endpoint, credential)?.get_device_information().map(|_| ())
    }

    fn device_info(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<NvrDeviceInfo, DeviceError> {
        let info = Self::client(endpoint, credential)?.get_device_information()?;
        Ok(NvrDeviceInfo {
            model: info.model,
            firmware: info.firmware,
            serial: info.serial,
            channel_capacity: None,
        })
    }

    fn list_channels(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
    ) -> Result<Vec<ChannelInfo>, DeviceError> {
        let client = Self::client(endpoint, credential)?;
        let media_xaddr = client
            .get_capabilities()?
            .ok_or_else(|| DeviceError::Protocol("device has no media service".to_string()))?;
        let profiles = client.get_profiles(&media_xaddr)?;
        Ok(profiles
            .into_iter()
            .map(|profile| ChannelInfo {
                channel_ref: profile.token,
                name: profile.name,
                online: None,
            })
            .collect())
    }

    fn poll_events(
        &self,
        endpoint: &NvrEndpoint,
        credential: &PlainCredential,
        cursor: Option<&str>,
    ) -> Result<PolledEvents, DeviceError> {
        let client = Self::client(endpoint, credential)?;
        let since = cursor.and_then(|cursor| OffsetDateTime::parse(cursor, &Rfc3339).ok());
        let response = client.pull_messages()?;
        parse_notifications(&response, since)
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses pull-point notifications into raw events.
pub(crate) fn parse_notifications(
    response: &str,
    since: Option<OffsetDateTime>,
) -> Result<PolledEvents, DeviceError> {
    let topics = xml::all_texts(response, "Topic")?;
    let times = xml::all_texts(response, "UtcTime")
        .ok()
        .filter(|times| !times.is_empty())
        .map_or_else(|| xml::all_texts(response, "Time").unwrap_or_default(), |times| times);

    let mut events = Vec::new();
    let mut newest: Option<OffsetDateTime> = None;
    for (index, topic) in topics.iter().enumerate() {
        let occurred_at = times
            .get(index)
            .and_then(|time| OffsetDateTime::parse(time, &Rfc3339).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);
        if let Some(since) = since {
            if occurred_at <= since {
                continue;
            }
        }
        let event_type = normalize_topic(topic);
        let time_label = occurred_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| occurred_at.unix_timestamp().to_string());
        events.push(RawNvrEvent {
            stable_key: format!("{topic}:{time_label}"),
            event_type,
            channel_ref: None,
            occurred_at,
            payload: serde_json::json!({ "topic": topic }),
        });
        if newest.is_none_or(|newest| occurred_at > newest) {
            newest = Some(occurred_at);
        }
    }
    let next_cursor = newest.and_then(|newest| newest.format(&Rfc3339).ok());
    Ok(PolledEvents {
        events,
        next_cursor,
    })
}

/// Folds ONVIF topic paths into the vendor-agnostic type set.
fn normalize_topic(topic: &str) -> String {
    let topic = topic.to_ascii_lowercase();
    if topic.contains("motion") {
        "motion".to_string()
    } else if topic.contains("videoloss") || topic.contains("signalloss") {
        "video_loss".to_string()
    } else if topic.contains("tamper") {
        "tamper".to_string()
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    const NOTIFY: &str = r#"<tev:PullMessagesResponse
        xmlns:tev="http://www.onvif.org/ver10/events/wsdl"
        xmlns:wsnt="http://docs.oasis-open.org/wsn/b-2">
      <wsnt:NotificationMessage>
        <wsnt:Topic>tns1:RuleEngine/CellMotionDetector/Motion</wsnt:Topic>
        <tt:Message UtcTime="x" xmlns:tt="http://www.onvif.org/ver10/schema">
          <tt:UtcTime>2026-03-01T10:05:00Z</tt:UtcTime>
        </tt:Message>
      </wsnt:NotificationMessage>
      <wsnt:NotificationMessage>
        <wsnt:Topic>tns1:VideoSource/SignalLoss</wsnt:Topic>
        <tt:Message xmlns:tt="http://www.onvif.org/ver10/schema">
          <tt:UtcTime>2026-03-01T10:06:00Z</tt:UtcTime>
        </tt:Message>
      </wsnt:NotificationMessage>
    </tev:PullMessagesResponse>"#;

    #[test]
    fn parses_notifications_and_normalizes_topics() {
        let polled = parse_notifications(NOTIFY, None).unwrap();
        assert_eq!(polled.events.len(), 2);
        assert_eq!(polled.events[0].event_type, "motion");
        assert_eq!(polled.events[1].event_type, "video_loss");
        assert_eq!(polled.next_cursor.as_deref(), Some("2026-03-01T10:06:00Z"));
    }

    #[test]
    fn cursor_filters_old_notifications() {
        let since = OffsetDateTime::parse("2026-03-01T10:05:30Z", &Rfc3339).unwrap();
        let polled = parse_notifications(NOTIFY, Some(since)).unwrap();
        assert_eq!(polled.events.len(), 1);
        assert_eq!(polled.events[0].event_type, "video_loss");
    }
}
