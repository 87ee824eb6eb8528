// crates/vigil-core/src/core/events.rs
// ============================================================================
// Module: Event Payloads
// Description: Vendor-agnostic NVR events and append-only audit events.
// Purpose: Provide the wire and persistence shapes for the event pipeline.
// Dependencies: serde, sha2, time, uuid
// ============================================================================

//! ## Overview
//! Two event families cross process boundaries: NVR events published to the
//! bus with at-least-once semantics, and audit events appended to the audit
//! log. Both carry an idempotency key so consumers and the store can collapse
//! duplicates.
//!
//! ## Invariants
//! - `NvrEvent::event_id` is a pure function of the NVR and the vendor's
//!   stable key, so re-polls of the same vendor event reproduce the same id.
//! - Audit events are append-only; no update or delete shapes exist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::core::identifiers::AuditEventId;
use crate::core::identifiers::CameraId;
use crate::core::identifiers::NvrId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: NVR Events
// ============================================================================

/// A raw event as returned by a vendor adapter, before enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNvrEvent {
    /// Vendor-stable identity for the event occurrence.
    pub stable_key: String,
    /// Vendor-agnostic event type label (e.g. `motion`, `video_loss`).
    pub event_type: String,
    /// Channel reference the event applies to, when channel-scoped.
    pub channel_ref: Option<String>,
    /// When the event occurred on the device.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    /// Vendor payload details.
    pub payload: Value,
}

/// A vendor-agnostic event ready for publication on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvrEvent {
    /// Idempotency key, derived from the NVR id and the vendor stable key.
    pub event_id: String,
    /// Source NVR.
    pub nvr_id: NvrId,
    /// Linked camera, when the channel maps to one.
    pub camera_id: Option<CameraId>,
    /// Camera display name, when resolved.
    pub camera_name: Option<String>,
    /// Site display name, when resolved.
    pub site_name: Option<String>,
    /// Vendor-agnostic event type label.
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event occurred on the device.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    /// Vendor payload details.
    pub payload: Value,
}

impl NvrEvent {
    /// Derives the stable idempotency key for an event occurrence.
    #[must_use]
    pub fn derive_event_id(nvr_id: NvrId, stable_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(nvr_id.as_uuid().as_bytes());
        hasher.update(b":");
        hasher.update(stable_key.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Returns the NATS subject for this event.
    #[must_use]
    pub fn subject(&self) -> String {
        format!("events.nvr.{}", self.event_type)
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// Action completed.
    Success,
    /// Action failed; `reason_code` explains why.
    Failure,
}

/// An append-only audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Idempotency key; unique in the audit table.
    pub event_id: AuditEventId,
    /// Tenant the action executed under.
    pub tenant_id: TenantId,
    /// Acting user; `None` for system actions.
    pub actor_user_id: Option<UserId>,
    /// Action label in `resource.action` form.
    pub action: String,
    /// Target entity type label, when the action has a target.
    pub target_type: Option<String>,
    /// Target entity id, when the action has a target.
    pub target_id: Option<String>,
    /// Action outcome.
    pub result: AuditResult,
    /// Machine-readable reason code, mandatory for failures.
    pub reason_code: Option<String>,
    /// Correlation id of the originating request.
    pub request_id: Option<String>,
    /// Caller IP, when known.
    pub client_ip: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
    /// Free-form structured context.
    pub metadata: Value,
    /// When the event was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Inputs required to construct an audit event.
#[derive(Debug, Clone)]
pub struct AuditEventParams {
    /// Tenant the action executed under.
    pub tenant_id: TenantId,
    /// Acting user; `None` for system actions.
    pub actor_user_id: Option<UserId>,
    /// Action label in `resource.action` form.
    pub action: String,
    /// Target entity type label.
    pub target_type: Option<String>,
    /// Target entity id.
    pub target_id: Option<String>,
    /// Action outcome.
    pub result: AuditResult,
    /// Machine-readable reason code.
    pub reason_code: Option<String>,
    /// Correlation id of the originating request.
    pub request_id: Option<String>,
    /// Caller IP.
    pub client_ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
    /// Free-form structured context.
    pub metadata: Value,
}

impl AuditEvent {
    /// Creates a new audit event with a fresh idempotency key.
    #[must_use]
    pub fn new(params: AuditEventParams, now: OffsetDateTime) -> Self {
        Self {
            event_id: AuditEventId::generate(),
            tenant_id: params.tenant_id,
            actor_user_id: params.actor_user_id,
            action: params.action,
            target_type: params.target_type,
            target_id: params.target_id,
            result: params.result,
            reason_code: params.reason_code,
            request_id: params.request_id,
            client_ip: params.client_ip,
            user_agent: params.user_agent,
            metadata: params.metadata,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions favor direct unwraps.")]

    use super::*;

    #[test]
    fn event_id_is_stable_for_same_inputs() {
        let nvr = NvrId::generate();
        let first = NvrEvent::derive_event_id(nvr, "ch1:motion:1714000000");
        let second = NvrEvent::derive_event_id(nvr, "ch1:motion:1714000000");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn event_id_differs_across_nvrs() {
        let key = "ch1:motion:1714000000";
        let first = NvrEvent::derive_event_id(NvrId::generate(), key);
        let second = NvrEvent::derive_event_id(NvrId::generate(), key);
        assert_ne!(first, second);
    }

    #[test]
    fn subject_embeds_event_type() {
        let event = NvrEvent {
            event_id: "abc".to_string(),
            nvr_id: NvrId::generate(),
            camera_id: None,
            camera_name: None,
            site_name: None,
            event_type: "motion".to_string(),
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            payload: serde_json::json!({}),
        };
        assert_eq!(event.subject(), "events.nvr.motion");
    }

    #[test]
    fn wire_shape_uses_type_field() {
        let event = NvrEvent {
            event_id: "abc".to_string(),
            nvr_id: NvrId::generate(),
            camera_id: None,
            camera_name: None,
            site_name: None,
            event_type: "video_loss".to_string(),
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            payload: serde_json::json!({"channel": 3}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "video_loss");
        assert!(value.get("event_type").is_none());
    }
}
