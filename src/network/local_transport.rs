//! In-memory [`BattleTransport`].
//!
//! Delivers snapshots synchronously on the caller's thread and records every
//! outbound message. Useful for tests, replays and single-process embedders.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::battle::Battle;
use crate::network::codec::{decode_snapshot, WireFormat};
use crate::network::messages::{BattleEventKind, OutboundMessage, WireSnapshot};
use crate::network::transport::{BattleTransport, SnapshotHandler, Unsubscribe};
use crate::BattleSyncResult;

type SharedHandler = Arc<Mutex<SnapshotHandler>>;

#[derive(Default)]
struct Registry {
    handlers: Mutex<BTreeMap<u64, (BattleEventKind, SharedHandler)>>,
    next_id: AtomicU64,
    sent: Mutex<Vec<OutboundMessage>>,
}

/// An in-process transport. Clones share the same registry.
#[derive(Clone, Default)]
pub struct LocalTransport {
    registry: Arc<Registry>,
}

impl LocalTransport {
    /// Creates a transport with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a snapshot to every handler registered for `kind`.
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// subscribe or unsubscribe. Returns the number of handlers invoked.
    pub fn deliver(&self, kind: BattleEventKind, snapshot: &WireSnapshot) -> usize {
        let targets: Vec<SharedHandler> = self
            .registry
            .handlers
            .lock()
            .values()
            .filter(|(registered, _)| *registered == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        tracing::trace!(topic = kind.topic(), handlers = targets.len(), "delivering snapshot");
        for handler in &targets {
            let mut handler = handler.lock();
            (*handler)(snapshot.clone());
        }
        targets.len()
    }

    /// Delivers a [`Battle`] as its wire snapshot.
    pub fn deliver_battle(&self, kind: BattleEventKind, battle: &Battle) -> usize {
        self.deliver(kind, &WireSnapshot::from(battle))
    }

    /// Decodes `bytes` and delivers the result.
    pub fn deliver_encoded(
        &self,
        kind: BattleEventKind,
        format: WireFormat,
        bytes: &[u8],
    ) -> BattleSyncResult<usize> {
        let snapshot = decode_snapshot(format, bytes)?;
        Ok(self.deliver(kind, &snapshot))
    }

    /// Every message sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.registry.sent.lock().clone()
    }

    /// Removes and returns every message sent so far.
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.registry.sent.lock())
    }

    /// Number of live handlers across all kinds.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.handlers.lock().len()
    }

    /// Number of live handlers for `kind`.
    #[must_use]
    pub fn handler_count_for(&self, kind: BattleEventKind) -> usize {
        self.registry
            .handlers
            .lock()
            .values()
            .filter(|(registered, _)| *registered == kind)
            .count()
    }
}

impl BattleTransport for LocalTransport {
    fn subscribe(&self, kind: BattleEventKind, handler: SnapshotHandler) -> Unsubscribe {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .lock()
            .insert(id, (kind, Arc::new(Mutex::new(handler))));
        tracing::trace!(topic = kind.topic(), id, "handler registered");

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        Unsubscribe::new(move || {
            if let Some(registry) = registry.upgrade() {
                if registry.handlers.lock().remove(&id).is_some() {
                    tracing::trace!(topic = kind.topic(), id, "handler released");
                }
            }
        })
    }

    fn send(&self, message: &OutboundMessage) {
        tracing::debug!(topic = message.topic(), "sending outbound message");
        self.registry.sent.lock().push(message.clone());
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("handlers", &self.handler_count())
            .field("sent", &self.registry.sent.lock().len())
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
    use crate::battle::{BattleId, UserId};
    use crate::network::codec::encode_snapshot;

    fn counting_handler(counter: &Arc<AtomicU64>) -> SnapshotHandler {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn deliver_reaches_only_matching_kind() {
        let transport = LocalTransport::new();
        let starts = Arc::new(AtomicU64::new(0));
        let ends = Arc::new(AtomicU64::new(0));
        let _a = transport.on_battle_start(counting_handler(&starts));
        let _b = transport.on_battle_end(counting_handler(&ends));

        assert_eq!(
            transport.deliver(BattleEventKind::Start, &WireSnapshot::default()),
            1
        );
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn release_removes_handler() {
        let transport = LocalTransport::new();
        let calls = Arc::new(AtomicU64::new(0));
        let unsubscribe = transport.on_battle_update(counting_handler(&calls));
        assert_eq!(transport.handler_count_for(BattleEventKind::Update), 1);

        unsubscribe.release();
        assert_eq!(transport.handler_count(), 0);
        assert_eq!(
            transport.deliver(BattleEventKind::Update, &WireSnapshot::default()),
            0
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_outliving_transport_is_harmless() {
        let transport = LocalTransport::new();
        let unsubscribe = transport.on_battle_start(Box::new(|_| {}));
        drop(transport);
        unsubscribe.release();
    }

    #[test]
    fn handler_may_unsubscribe_during_delivery() {
        let transport = LocalTransport::new();
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let unsubscribe = transport.on_battle_start(Box::new(move |_| {
            if let Some(unsubscribe) = inner.lock().take() {
                unsubscribe.release();
            }
        }));
        *slot.lock() = Some(unsubscribe);

        transport.deliver(BattleEventKind::Start, &WireSnapshot::default());
        assert_eq!(transport.handler_count(), 0);
    }

    #[test]
    fn deliver_encoded_decodes_first() {
        let transport = LocalTransport::new();
        let seen: Arc<Mutex<Vec<WireSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = transport.on_battle_start(Box::new(move |snapshot| sink.lock().push(snapshot)));

        let snapshot = WireSnapshot {
            id: Some("b1".to_owned()),
            ..WireSnapshot::default()
        };
        let bytes = encode_snapshot(WireFormat::Json, &snapshot).unwrap();
        assert_eq!(
            transport
                .deliver_encoded(BattleEventKind::Start, WireFormat::Json, &bytes)
                .unwrap(),
            1
        );
        assert_eq!(seen.lock()[0], snapshot);

        assert!(transport
            .deliver_encoded(BattleEventKind::Start, WireFormat::Json, b"[")
            .is_err());
    }

    #[test]
    fn send_records_messages() {
        let transport = LocalTransport::new();
        let vote = OutboundMessage::Vote {
            battle_id: BattleId::new("b1"),
            participant_id: UserId::new("alice"),
        };
        transport.send(&vote);
        assert_eq!(transport.sent(), vec![vote.clone()]);
        assert_eq!(transport.take_sent(), vec![vote]);
        assert!(transport.sent().is_empty());
    }
}
