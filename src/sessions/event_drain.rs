use std::collections::vec_deque::IntoIter;
use std::iter::FusedIterator;

use crate::SessionEvent;

/// An opaque iterator over the events drained from a session.
///
/// The events are taken out of the session's queue when the drain is created,
/// so the session may keep receiving snapshots while the drain is consumed.
/// Implements [`Iterator`], [`DoubleEndedIterator`], [`ExactSizeIterator`],
/// and [`FusedIterator`].
///
/// Obtain an `EventDrain` by calling [`BattleSession::events()`].
///
/// # Examples
///
/// ```ignore
/// for event in session.events() {
///     match event {
///         SessionEvent::BattleEnded { winner_id, .. } => show_result(winner_id),
///         _ => { /* handle other events */ }
///     }
/// }
/// ```
///
/// [`BattleSession::events()`]: crate::BattleSession::events
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain {
    inner: IntoIter<SessionEvent>,
}

impl EventDrain {
    pub(crate) fn new(events: std::collections::VecDeque<SessionEvent>) -> Self {
        Self {
            inner: events.into_iter(),
        }
    }
}

impl Iterator for EventDrain {
    type Item = SessionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain {}

impl std::fmt::Debug for EventDrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
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
    use crate::battle::BattleId;
    use std::collections::VecDeque;

    fn make_event(id: &str) -> SessionEvent {
        SessionEvent::BattleCleared {
            battle_id: BattleId::new(id),
        }
    }

    fn queue(ids: &[&str]) -> VecDeque<SessionEvent> {
        ids.iter().map(|id| make_event(id)).collect()
    }

    #[test]
    fn empty_drain_returns_none() {
        let mut drain = EventDrain::new(VecDeque::new());
        assert!(drain.next().is_none());
        assert_eq!(drain.len(), 0);
    }

    #[test]
    fn drain_yields_all_events_in_order() {
        let events: Vec<_> = EventDrain::new(queue(&["a", "b", "c"])).collect();
        assert_eq!(events, vec![make_event("a"), make_event("b"), make_event("c")]);
    }

    #[test]
    fn drain_is_fused() {
        let mut drain = EventDrain::new(queue(&["a"]));
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn double_ended_iteration() {
        let mut drain = EventDrain::new(queue(&["a", "b", "c"]));
        assert_eq!(drain.next_back(), Some(make_event("c")));
        assert_eq!(drain.next(), Some(make_event("a")));
        assert_eq!(drain.next_back(), Some(make_event("b")));
        assert!(drain.next().is_none());
    }

    #[test]
    fn exact_size_is_accurate() {
        let mut drain = EventDrain::new(queue(&["a", "b"]));
        assert_eq!(drain.size_hint(), (2, Some(2)));
        let _ = drain.next();
        assert_eq!(drain.len(), 1);
    }

    #[test]
    fn debug_format_shows_remaining_count() {
        let drain = EventDrain::new(queue(&["a", "b"]));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 2 }");
    }
}
