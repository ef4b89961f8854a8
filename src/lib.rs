//! # Battle Sync
//!
//! Battle Sync keeps a client's view of a live-stream "battle" consistent with
//! the authoritative server. Two participants compete for a fixed duration,
//! viewers vote, and the server pushes full snapshots of the battle over a
//! duplex event channel.
//!
//! The engine is snapshot-driven: every inbound snapshot is validated, checked
//! for staleness against the held battle, and either replaces it or is
//! dropped and reported through [`telemetry`]. The countdown is derived from
//! the server's start time and the wall clock, never decremented locally.
//! Votes are fire-and-forget intents; their effect arrives as a later
//! snapshot.
//!
//! ```
//! use std::sync::Arc;
//! use battle_sync::network::local_transport::LocalTransport;
//! use battle_sync::SessionBuilder;
//!
//! let transport = Arc::new(LocalTransport::new());
//! let mut session = SessionBuilder::new().start(transport, "stream-42")?;
//!
//! for event in session.events() {
//!     println!("{event:?}");
//! }
//! # Ok::<(), battle_sync::BattleSyncError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use battle::{Battle, BattleId, Participant, Phase, Side, StreamId, UserId};
pub use countdown::{Clock, Countdown, CountdownPoll, ManualClock, StopReason, SystemClock};
pub use error::BattleSyncError;
pub use network::local_transport::LocalTransport;
pub use network::messages::{BattleEventKind, OutboundMessage, WireSnapshot};
pub use network::transport::{BattleTransport, SnapshotHandler, Unsubscribe};
pub use presentation::{ScoreboardView, VoteSplit};
pub use sessions::battle_session::BattleSession;
pub use sessions::builder::{SessionBuilder, SyncConfig};
#[cfg(feature = "tokio")]
pub use sessions::countdown_task::CountdownTask;
pub use sessions::event_drain::EventDrain;
pub use store::{ApplyOutcome, BattleStoreHandle, OrderingPolicy, RejectReason, StreamBinding};
pub use vote::{VoteDispatch, VoteEmitter};

pub mod battle;
pub mod countdown;
#[doc(hidden)]
pub mod error;
pub mod prelude;
pub mod presentation;
pub mod store;
pub mod telemetry;
pub mod vote;
pub mod sessions {
    //! Session façade, configuration and the transport subscription.
    pub mod battle_session;
    /// Fluent construction of a [`BattleSession`](crate::BattleSession).
    pub mod builder;
    pub mod config;
    #[cfg(feature = "tokio")]
    pub mod countdown_task;
    /// Owned iterator over drained session events.
    pub mod event_drain;
    pub mod subscription;
}
pub mod network {
    //! Transport seam, wire messages and their codecs.

    pub mod codec;
    pub mod local_transport;
    pub mod messages;
    pub mod transport;
}

/// A specialized `Result` for Battle Sync operations.
pub type BattleSyncResult<T> = Result<T, BattleSyncError>;

// #############
// #   EVENTS  #
// #############

/// Notifications produced by a [`BattleSession`], drained with
/// [`BattleSession::events`].
///
/// Events are derived from changes the store accepted. Rejected and
/// duplicate snapshots produce none.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new variants may be added in
/// future versions. Always include a wildcard arm when matching:
///
/// ```ignore
/// match event {
///     SessionEvent::BattleEnded { winner_id, .. } => { /* handle */ }
///     _ => { /* handle other events */ }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A battle appeared, on an empty store or replacing a finished one.
    BattleStarted {
        /// The battle.
        battle_id: BattleId,
        /// Its phase when first seen.
        phase: Phase,
    },
    /// The held battle moved to a later phase.
    PhaseChanged {
        /// The battle.
        battle_id: BattleId,
        /// Phase before.
        from: Phase,
        /// Phase after.
        to: Phase,
    },
    /// Server scores changed.
    ScoresChanged {
        /// The battle.
        battle_id: BattleId,
        /// Participant A's score.
        score_a: u64,
        /// Participant B's score.
        score_b: u64,
    },
    /// The battle reached `completed` or `cancelled`.
    BattleEnded {
        /// The battle.
        battle_id: BattleId,
        /// The terminal phase.
        phase: Phase,
        /// The winner, if the server named one.
        winner_id: Option<UserId>,
    },
    /// The store was cleared.
    BattleCleared {
        /// The battle that was held.
        battle_id: BattleId,
    },
    /// The polled countdown stopped.
    CountdownStopped {
        /// Why it stopped.
        reason: StopReason,
    },
    /// The session now follows another stream.
    StreamSwitched {
        /// The stream left.
        from: StreamId,
        /// The stream joined.
        to: StreamId,
    },
}

impl SessionEvent {
    /// The battle this event concerns, if any.
    #[must_use]
    pub fn battle_id(&self) -> Option<&BattleId> {
        match self {
            Self::BattleStarted { battle_id, .. }
            | Self::PhaseChanged { battle_id, .. }
            | Self::ScoresChanged { battle_id, .. }
            | Self::BattleEnded { battle_id, .. }
            | Self::BattleCleared { battle_id } => Some(battle_id),
            Self::CountdownStopped { .. } | Self::StreamSwitched { .. } => None,
        }
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

    #[test]
    fn battle_id_accessor() {
        let started = SessionEvent::BattleStarted {
            battle_id: BattleId::new("b1"),
            phase: Phase::Pending,
        };
        assert_eq!(started.battle_id(), Some(&BattleId::new("b1")));

        let switched = SessionEvent::StreamSwitched {
            from: StreamId::new("s1"),
            to: StreamId::new("s2"),
        };
        assert_eq!(switched.battle_id(), None);
    }

    #[test]
    fn session_types_are_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<BattleSession>();
        assert_send_sync::<BattleStoreHandle>();
        assert_send_sync::<LocalTransport>();
        assert_send_sync::<SessionEvent>();
    }
}
