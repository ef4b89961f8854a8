//! Configuration types for battle sessions.
//!
//! # Overview
//!
//! | Preset | Tick period | Ordering | Event queue |
//! |--------|-------------|----------|-------------|
//! | `new()` | 1 s | phase order | 100 |
//! | `strict()` | 1 s | strict sequence | 100 |
//! | `low_power()` | 5 s | phase order | 16 |
//!
//! # Example
//!
//! ```
//! use battle_sync::{SessionBuilder, SyncConfig};
//!
//! let builder = SessionBuilder::new().with_config(SyncConfig::strict());
//! ```

use web_time::Duration;

use crate::countdown::DEFAULT_TICK_PERIOD;
use crate::error::BattleSyncError;
use crate::store::OrderingPolicy;

/// Default event queue size.
/// Events older than this threshold are dropped if not drained.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;

const MIN_TICK_PERIOD: Duration = Duration::from_millis(10);
const MAX_TICK_PERIOD: Duration = Duration::from_secs(60);
const MAX_EVENT_QUEUE_SIZE: usize = 10_000;

/// Configuration for a [`BattleSession`](crate::BattleSession).
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Always use the
/// `..SyncConfig::default()` pattern when constructing instances.
///
/// # Example
///
/// ```
/// use battle_sync::SyncConfig;
/// use web_time::Duration;
///
/// let smooth = SyncConfig {
///     tick_period: Duration::from_millis(250),
///     ..SyncConfig::default()
/// };
/// assert!(smooth.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "SyncConfig has no effect unless passed to SessionBuilder::with_config()"]
pub struct SyncConfig {
    /// How often the countdown is recomputed.
    ///
    /// Default: 1 s
    pub tick_period: Duration,

    /// How snapshot staleness is decided.
    ///
    /// Default: [`OrderingPolicy::PhaseOrder`]
    pub ordering_policy: OrderingPolicy,

    /// Maximum number of undrained session events before the oldest are dropped.
    ///
    /// Default: 100
    pub event_queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            ordering_policy: OrderingPolicy::PhaseOrder,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
        }
    }
}

impl SyncConfig {
    /// Creates a new `SyncConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for backends that stamp every snapshot with a
    /// per-battle sequence number. Unstamped snapshots are rejected.
    pub fn strict() -> Self {
        Self {
            ordering_policy: OrderingPolicy::StrictSequence,
            ..Self::default()
        }
    }

    /// Configuration preset for background or battery-constrained views.
    ///
    /// The countdown is still derived from the wall clock, so a slower tick
    /// never drifts; it only refreshes less often.
    pub fn low_power() -> Self {
        Self {
            tick_period: Duration::from_secs(5),
            ordering_policy: OrderingPolicy::PhaseOrder,
            event_queue_size: 16,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `BattleSyncError::InvalidConfig` if any value is out of range.
    pub fn validate(&self) -> Result<(), BattleSyncError> {
        // tick_period: 10ms to 60s
        if self.tick_period < MIN_TICK_PERIOD || self.tick_period > MAX_TICK_PERIOD {
            return Err(BattleSyncError::InvalidConfig {
                info: format!(
                    "tick_period must be between {}ms and {}ms, got {}ms",
                    MIN_TICK_PERIOD.as_millis(),
                    MAX_TICK_PERIOD.as_millis(),
                    self.tick_period.as_millis()
                ),
            });
        }

        // event_queue_size: 1 to 10000
        if self.event_queue_size < 1 || self.event_queue_size > MAX_EVENT_QUEUE_SIZE {
            return Err(BattleSyncError::InvalidConfig {
                info: format!(
                    "event_queue_size must be between 1 and {}, got {}",
                    MAX_EVENT_QUEUE_SIZE, self.event_queue_size
                ),
            });
        }

        Ok(())
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
    fn default_values() {
        let config = SyncConfig::default();
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(config.ordering_policy, OrderingPolicy::PhaseOrder);
        assert_eq!(config.event_queue_size, 100);
        assert_eq!(SyncConfig::new(), config);
    }

    #[test]
    fn strict_preset_requires_sequences() {
        assert_eq!(
            SyncConfig::strict().ordering_policy,
            OrderingPolicy::StrictSequence
        );
    }

    #[test]
    fn low_power_preset() {
        let config = SyncConfig::low_power();
        assert_eq!(config.tick_period, Duration::from_secs(5));
        assert_eq!(config.event_queue_size, 16);
    }

    /// Data-driven test: all presets should pass validation.
    #[test]
    fn all_presets_are_valid() {
        let presets: &[(&str, SyncConfig)] = &[
            ("new", SyncConfig::new()),
            ("strict", SyncConfig::strict()),
            ("low_power", SyncConfig::low_power()),
        ];
        for (name, config) in presets {
            assert!(
                config.validate().is_ok(),
                "Preset '{}' should be valid, but validation failed: {:?}",
                name,
                config.validate()
            );
        }
    }

    #[test]
    fn tick_period_bounds() {
        let too_fast = SyncConfig {
            tick_period: Duration::from_millis(1),
            ..SyncConfig::default()
        };
        let err = too_fast.validate().unwrap_err();
        assert!(err.to_string().contains("tick_period"));

        let too_slow = SyncConfig {
            tick_period: Duration::from_secs(61),
            ..SyncConfig::default()
        };
        assert!(too_slow.validate().is_err());

        let edge = SyncConfig {
            tick_period: Duration::from_millis(10),
            ..SyncConfig::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn event_queue_bounds() {
        let empty = SyncConfig {
            event_queue_size: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(BattleSyncError::InvalidConfig { .. })
        ));

        let huge = SyncConfig {
            event_queue_size: 10_001,
            ..SyncConfig::default()
        };
        assert!(huge.validate().is_err());
    }
}
