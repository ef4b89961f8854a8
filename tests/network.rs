//! Network integration tests.
//!
//! This module contains integration tests for the wire layer:
//! - Codec tests - JSON and binary snapshots and outbound votes
//! - Transport tests - the `BattleTransport` seam with a custom implementation

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Network test modules
mod network {
    pub mod codec;
    pub mod transport;
}
