// crates/vigil-media/src/lib.rs
// ============================================================================
// Module: Vigil Media Library
// Description: RPC client for the external media plane.
// Purpose: Expose bounded ingest, egress, and snapshot operations.
// Dependencies: crate::client
// ============================================================================

//! ## Overview
//! Thin client of the media plane's JSON RPC surface. All calls are bounded
//! by [`MEDIA_CALL_DEADLINE`] and fail with a closed kind set, so the rest
//! of the control plane can treat media unavailability as a degradation
//! rather than an outage.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::IngestStatus;
pub use client::MEDIA_CALL_DEADLINE;
pub use client::MediaClient;
pub use client::MediaError;
pub use client::MediaErrorKind;
pub use client::STALL_THRESHOLD_RUNNING;
pub use client::STALL_THRESHOLD_STARTING;
