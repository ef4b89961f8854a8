//! The duplex event channel this engine consumes.
//!
//! A transport delivers named snapshot events and accepts outgoing messages.
//! Concrete transports (websocket clients, bridges, the in-memory
//! [`LocalTransport`](crate::network::local_transport::LocalTransport)) live
//! outside the engine's core and only need to implement [`BattleTransport`].

use crate::network::messages::{BattleEventKind, OutboundMessage, WireSnapshot};

/// Callback invoked with each delivered snapshot.
pub type SnapshotHandler = Box<dyn FnMut(WireSnapshot) + Send>;

/// A publish/subscribe channel carrying battle events.
pub trait BattleTransport: Send + Sync {
    /// Registers `handler` for events of `kind`.
    ///
    /// The handler stays registered until the returned [`Unsubscribe`] is
    /// released or dropped.
    #[must_use = "dropping the Unsubscribe immediately releases the handler"]
    fn subscribe(&self, kind: BattleEventKind, handler: SnapshotHandler) -> Unsubscribe;

    /// Publishes a message. Fire-and-forget: no acknowledgement, no retry.
    fn send(&self, message: &OutboundMessage);

    /// Registers a `battle:start` handler.
    #[must_use = "dropping the Unsubscribe immediately releases the handler"]
    fn on_battle_start(&self, handler: SnapshotHandler) -> Unsubscribe {
        self.subscribe(BattleEventKind::Start, handler)
    }

    /// Registers a `battle:update` handler.
    #[must_use = "dropping the Unsubscribe immediately releases the handler"]
    fn on_battle_update(&self, handler: SnapshotHandler) -> Unsubscribe {
        self.subscribe(BattleEventKind::Update, handler)
    }

    /// Registers a `battle:end` handler.
    #[must_use = "dropping the Unsubscribe immediately releases the handler"]
    fn on_battle_end(&self, handler: SnapshotHandler) -> Unsubscribe {
        self.subscribe(BattleEventKind::End, handler)
    }
}

/// Releases a transport registration exactly once.
///
/// Release happens on [`Unsubscribe::release`] or on drop, whichever comes first.
#[must_use = "dropping the Unsubscribe immediately releases the handler"]
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    /// Wraps the transport's release action.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A registration with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Releases the registration now.
    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("pending", &self.release.is_some())
            .finish()
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn release_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let unsubscribe = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        unsubscribe.release();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _unsubscribe = Unsubscribe::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_debug() {
        assert_eq!(
            format!("{:?}", Unsubscribe::noop()),
            "Unsubscribe { pending: false }"
        );
    }
}
