//! Session integration tests.
//!
//! This module contains integration tests for `BattleSession`:
//! - Lifecycle - a battle from announcement to result
//! - Stream switching - filtering and re-subscription
//! - Votes - outbound intents
//! - Global store - sessions sharing the process-wide store

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Session test modules
mod sessions {
    pub mod global_store;
    pub mod lifecycle;
    pub mod stream_switch;
    pub mod votes;
}
