//! Configuration presets and builder validation.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use battle_sync::{
    BattleSyncError, LocalTransport, OrderingPolicy, SessionBuilder, StreamId, SyncConfig,
};
use web_time::Duration;

#[test]
fn presets_validate() {
    for config in [SyncConfig::new(), SyncConfig::strict(), SyncConfig::low_power()] {
        config.validate().unwrap();
    }
}

#[test]
fn struct_update_syntax_is_supported() {
    let config = SyncConfig {
        tick_period: Duration::from_millis(500),
        ..SyncConfig::default()
    };
    assert_eq!(config.ordering_policy, OrderingPolicy::PhaseOrder);
    assert!(config.validate().is_ok());
}

#[test]
fn builder_rejects_out_of_range_tick() {
    let transport = Arc::new(LocalTransport::new());
    let err = SessionBuilder::new()
        .with_tick_period(Duration::from_secs(120))
        .start(transport.clone(), "s1")
        .unwrap_err();
    assert!(matches!(err, BattleSyncError::InvalidConfig { .. }));
    assert!(err.to_string().contains("tick_period"));
    assert_eq!(transport.handler_count(), 0);
}

#[test]
fn builder_rejects_oversized_queue_at_start() {
    let err = SessionBuilder::new()
        .with_event_queue_size(20_000)
        .unwrap()
        .start(Arc::new(LocalTransport::new()), "s1")
        .unwrap_err();
    assert!(matches!(err, BattleSyncError::InvalidConfig { .. }));
}

#[test]
fn builder_accepts_string_and_stream_id() {
    let transport = Arc::new(LocalTransport::new());
    let owned = SessionBuilder::new()
        .start(transport.clone(), String::from("s1"))
        .unwrap();
    let typed = SessionBuilder::new()
        .start(transport, StreamId::new("s2"))
        .unwrap();
    assert_eq!(owned.stream_id(), Some(&StreamId::new("s1")));
    assert_eq!(typed.stream_id(), Some(&StreamId::new("s2")));
}

#[test]
fn strict_config_reaches_the_store() {
    let session = SessionBuilder::new()
        .with_config(SyncConfig::strict())
        .start(Arc::new(LocalTransport::new()), "s1")
        .unwrap();
    assert_eq!(session.store().policy(), OrderingPolicy::StrictSequence);
    assert_eq!(session.config().ordering_policy, OrderingPolicy::StrictSequence);
}
