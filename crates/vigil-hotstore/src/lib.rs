// crates/vigil-hotstore/src/lib.rs
// ============================================================================
// Module: Vigil Hot Store Library
// Description: Redis implementations of the core hot-store interfaces.
// Purpose: Provide the durable-ephemeral backend for sessions, demand,
//          detections, rate windows, and tokens.
// Dependencies: crate::{demand, detections, rate, sessions, store, tokens}
// ============================================================================

//! ## Overview
//! [`HotStore`] implements every hot-store trait from `vigil-core` against
//! Redis: viewer sessions with atomic multi-key writes, the overlay demand
//! sorted set, the latest-detection cache, fixed-window rate counters, and
//! single-use token records. All expiry is server-side TTL.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod demand;
pub mod detections;
pub mod rate;
pub mod sessions;
pub mod store;
pub mod tokens;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::HotStore;
