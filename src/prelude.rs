//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used types
//! from Battle Sync, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use battle_sync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Session types**: [`BattleSession`], [`SessionBuilder`], [`SyncConfig`]
//! - **Battle model**: [`Battle`], [`Participant`], [`Phase`], [`Side`] and the id newtypes
//! - **Transport**: [`BattleTransport`], [`LocalTransport`], [`BattleEventKind`]
//! - **Store**: [`BattleStoreHandle`], [`ApplyOutcome`], [`OrderingPolicy`]
//! - **Events**: [`SessionEvent`], [`CountdownPoll`], [`StopReason`]
//! - **Error handling**: [`BattleSyncError`], [`BattleSyncResult`]
//!
//! # Example
//!
//! ```rust
//! use battle_sync::prelude::*;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(LocalTransport::new());
//! let session: BattleSession = SessionBuilder::new().start(transport, "stream-1")?;
//! assert_eq!(session.phase(), None);
//! # Ok::<(), BattleSyncError>(())
//! ```

// Core session types
pub use crate::sessions::battle_session::BattleSession;
pub use crate::sessions::builder::SessionBuilder;

// Battle model
pub use crate::battle::{Battle, BattleId, Participant, Phase, Side, StreamId, UserId};

// Transport
pub use crate::network::local_transport::LocalTransport;
pub use crate::network::messages::{BattleEventKind, OutboundMessage};
pub use crate::network::transport::{BattleTransport, Unsubscribe};

// Store
pub use crate::store::{ApplyOutcome, BattleStoreHandle, OrderingPolicy};

// Events and countdown
pub use crate::countdown::{CountdownPoll, StopReason};
pub use crate::SessionEvent;

// Votes and presentation
pub use crate::presentation::{ScoreboardView, VoteSplit};
pub use crate::vote::VoteDispatch;

// Error handling
pub use crate::{BattleSyncError, BattleSyncResult};

// Common configuration types
pub use crate::sessions::config::SyncConfig;
