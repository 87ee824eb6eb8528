// crates/vigil-server/src/events.rs
// ============================================================================
// Module: Event Bus Sink
// Description: NATS-backed implementation of the event sink seam.
// Purpose: Publish vendor-agnostic NVR events at-least-once.
// Dependencies: async-nats, vigil-core
// ============================================================================

//! ## Overview
//! One NATS client serves the whole process. Publishes flush before
//! reporting success so the at-least-once contract holds: a poll cycle
//! only advances its cursor after the bus acknowledged the handoff.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;

use vigil_core::EventSink;
use vigil_core::EventSinkError;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// NATS event sink.
pub struct NatsEventSink {
    /// Shared client.
    client: async_nats::Client,
}

impl NatsEventSink {
    /// Connects to the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventSinkError::Unavailable`] when the connection fails.
    pub async fn connect(url: &str) -> Result<Self, EventSinkError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| EventSinkError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
        })
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), EventSinkError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|err| EventSinkError::Unavailable(err.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|err| EventSinkError::Unavailable(err.to_string()))
    }
}
