//! Verification integration tests.
//!
//! This module contains property-based tests:
//! - Store ordering, idempotence and terminal immutability
//! - Countdown bounds and vote split arithmetic

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Verification test modules
mod verification {
    pub mod property;
}
