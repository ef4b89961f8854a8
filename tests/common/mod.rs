//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `fixtures`: battle snapshots and timestamps used by every suite
//! - `init_tracing`: opt-in log output, filtered by `RUST_LOG`
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::fixtures::{battle, t0};
//! ```

pub mod fixtures;

// These are public utilities for integration tests - allow unused until every suite adopts them.
#[allow(unused_imports)]
pub use fixtures::{active_battle, battle, participant, t0};

/// Installs a global `tracing` subscriber once per test binary.
///
/// Output goes to the test writer, so it only shows for failing tests or
/// with `--nocapture`.
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("battle_sync=debug")),
        )
        .with_test_writer()
        .try_init();
}
