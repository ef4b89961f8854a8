use std::sync::Arc;

use web_time::Duration;

use crate::{
    battle::StreamId,
    countdown::{Clock, SystemClock},
    network::transport::BattleTransport,
    report_violation_to,
    sessions::battle_session::BattleSession,
    store::{BattleStoreHandle, OrderingPolicy},
    telemetry::{ViolationKind, ViolationObserver, ViolationSeverity},
    BattleSyncError, BattleSyncResult,
};

// Re-export config types for code that imports from builder
pub use crate::sessions::config::SyncConfig;

/// The [`SessionBuilder`] builds a [`BattleSession`].
///
/// After setting all appropriate values, use [`SessionBuilder::start`] to
/// consume the builder and subscribe to a stream.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use battle_sync::{network::local_transport::LocalTransport, SessionBuilder, SyncConfig};
///
/// let transport = Arc::new(LocalTransport::new());
/// let session = SessionBuilder::new()
///     .with_config(SyncConfig::strict())
///     .start(transport, "stream-42")?;
/// assert!(session.current().is_none());
/// # Ok::<(), battle_sync::BattleSyncError>(())
/// ```
#[must_use = "SessionBuilder must be consumed by calling start()"]
pub struct SessionBuilder {
    /// Session configuration.
    config: SyncConfig,
    /// Source of wall-clock time for the countdown.
    clock: Arc<dyn Clock>,
    /// Optional observer for dropped snapshots and other anomalies.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    /// Store to write into. `None` creates a private one.
    store: Option<BattleStoreHandle>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            config,
            clock,
            violation_observer,
            store,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("config", config)
            .field("clock", clock)
            .field("has_violation_observer", &violation_observer.is_some())
            .field("store", store)
            .finish()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            clock: Arc::new(SystemClock),
            violation_observer: None,
            store: None,
        }
    }

    /// Replaces the whole configuration.
    ///
    /// Values are validated by [`start`](Self::start).
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how often the countdown is recomputed. Default is 1 s.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    /// Sets how snapshot staleness is decided. Default is [`OrderingPolicy::PhaseOrder`].
    ///
    /// The policy is applied to the store when the session starts, which also
    /// affects every other session sharing that store.
    pub fn with_ordering_policy(mut self, policy: OrderingPolicy) -> Self {
        self.config.ordering_policy = policy;
        self
    }

    /// Sets the maximum number of undrained events. Default is 100.
    ///
    /// # Errors
    /// - Returns [`InvalidConfig`] if the size is 0
    ///
    /// [`InvalidConfig`]: BattleSyncError::InvalidConfig
    pub fn with_event_queue_size(mut self, size: usize) -> BattleSyncResult<Self> {
        if size == 0 {
            return Err(BattleSyncError::InvalidConfig {
                info: "event_queue_size must be at least 1".to_owned(),
            });
        }
        self.config.event_queue_size = size;
        Ok(self)
    }

    /// Sets the clock the countdown reads. Default is [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets a custom observer for dropped snapshots and other anomalies.
    ///
    /// If no observer is set, violations are logged via the `tracing` crate.
    ///
    /// # Example
    ///
    /// ```
    /// use battle_sync::{SessionBuilder, telemetry::CollectingObserver};
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = SessionBuilder::new().with_violation_observer(observer.clone());
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Writes into `store` instead of a private one.
    pub fn with_store(mut self, store: BattleStoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    /// Writes into the process-wide [`BattleStoreHandle::global`] store.
    pub fn with_global_store(self) -> Self {
        self.with_store(BattleStoreHandle::global().clone())
    }

    /// Consumes the builder and subscribes to `stream_id` on `transport`.
    ///
    /// # Errors
    /// - Returns [`InvalidConfig`] if the configuration does not validate
    /// - Returns [`InvalidRequest`] if the stream id is empty, or if the
    ///   store is shared with sessions on another stream
    ///
    /// [`InvalidConfig`]: BattleSyncError::InvalidConfig
    /// [`InvalidRequest`]: BattleSyncError::InvalidRequest
    pub fn start(
        self,
        transport: Arc<dyn BattleTransport>,
        stream_id: impl Into<StreamId>,
    ) -> BattleSyncResult<BattleSession> {
        self.config.validate()?;
        let stream_id = stream_id.into();
        if stream_id.as_str().is_empty() {
            return Err(BattleSyncError::InvalidRequest {
                info: "stream id must not be empty".to_owned(),
            });
        }

        let store = self.store.unwrap_or_default();
        let binding = store.follow(stream_id.clone())?;
        if store.policy() != self.config.ordering_policy {
            if store.listener_count() > 0 {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Configuration,
                    "ordering policy of a shared store changed from {:?} to {:?}",
                    store.policy(),
                    self.config.ordering_policy
                );
            }
            tracing::debug!(
                from = ?store.policy(),
                to = ?self.config.ordering_policy,
                "store ordering policy changed"
            );
            store.set_policy(self.config.ordering_policy);
        }

        Ok(BattleSession::new(
            self.config,
            transport,
            binding,
            store,
            self.clock,
            self.violation_observer,
        ))
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::local_transport::LocalTransport;
    use crate::telemetry::CollectingObserver;

    fn transport() -> Arc<LocalTransport> {
        Arc::new(LocalTransport::new())
    }

    #[test]
    fn builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.config, SyncConfig::default());
        assert!(builder.violation_observer.is_none());
        assert!(builder.store.is_none());
    }

    #[test]
    fn fluent_setters_update_config() {
        let builder = SessionBuilder::new()
            .with_tick_period(Duration::from_millis(250))
            .with_ordering_policy(OrderingPolicy::StrictSequence)
            .with_event_queue_size(8)
            .unwrap();
        assert_eq!(builder.config.tick_period, Duration::from_millis(250));
        assert_eq!(builder.config.ordering_policy, OrderingPolicy::StrictSequence);
        assert_eq!(builder.config.event_queue_size, 8);
    }

    #[test]
    fn zero_event_queue_is_rejected() {
        assert!(matches!(
            SessionBuilder::new().with_event_queue_size(0),
            Err(BattleSyncError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn start_rejects_invalid_config() {
        let result = SessionBuilder::new()
            .with_tick_period(Duration::ZERO)
            .start(transport(), "s1");
        assert!(matches!(result, Err(BattleSyncError::InvalidConfig { .. })));
    }

    #[test]
    fn start_rejects_empty_stream() {
        let transport = transport();
        let result = SessionBuilder::new().start(transport.clone(), "");
        assert!(matches!(result, Err(BattleSyncError::InvalidRequest { .. })));
        assert_eq!(transport.handler_count(), 0);
    }

    #[test]
    fn start_applies_policy_to_store() {
        let store = BattleStoreHandle::new();
        let session = SessionBuilder::new()
            .with_config(SyncConfig::strict())
            .with_store(store.clone())
            .start(transport(), "s1")
            .unwrap();
        assert_eq!(store.policy(), OrderingPolicy::StrictSequence);
        assert!(session.store().ptr_eq(&store));
    }

    #[test]
    fn start_rejects_store_followed_on_another_stream() {
        let transport = transport();
        let store = BattleStoreHandle::new();
        let _first = SessionBuilder::new()
            .with_store(store.clone())
            .start(transport.clone(), "s1")
            .unwrap();
        let second = SessionBuilder::new()
            .with_store(store.clone())
            .start(transport.clone(), "s2");
        assert!(matches!(second, Err(BattleSyncError::InvalidRequest { .. })));
        assert_eq!(transport.handler_count(), 3);
        assert_eq!(store.followed_stream(), Some(StreamId::new("s1")));
    }

    #[test]
    fn changing_policy_of_shared_store_is_reported() {
        let store = BattleStoreHandle::new();
        let observer = Arc::new(CollectingObserver::new());
        let _first = SessionBuilder::new()
            .with_store(store.clone())
            .start(transport(), "s1")
            .unwrap();
        let _second = SessionBuilder::new()
            .with_config(SyncConfig::strict())
            .with_violation_observer(observer.clone())
            .with_store(store.clone())
            .start(transport(), "s1")
            .unwrap();
        crate::assert_violation!(observer, ViolationKind::Configuration);
        assert_eq!(store.policy(), OrderingPolicy::StrictSequence);
    }

    #[test]
    fn private_store_policy_change_is_silent() {
        let observer = Arc::new(CollectingObserver::new());
        let _session = SessionBuilder::new()
            .with_config(SyncConfig::strict())
            .with_violation_observer(observer.clone())
            .start(transport(), "s1")
            .unwrap();
        crate::assert_no_violations!(observer);
    }

    #[test]
    fn start_registers_handlers() {
        let transport = transport();
        let session = SessionBuilder::new().start(transport.clone(), "s1").unwrap();
        assert_eq!(transport.handler_count(), 3);
        assert_eq!(session.stream_id(), Some(&StreamId::new("s1")));
    }

    #[test]
    fn debug_output_lists_fields() {
        let debug = format!("{:?}", SessionBuilder::new());
        assert!(debug.contains("SessionBuilder"));
        assert!(debug.contains("config"));
        assert!(debug.contains("has_violation_observer"));
    }
}
