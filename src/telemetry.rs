//! Structured telemetry pipeline for synchronization anomalies.
//!
//! Nothing on the inbound snapshot path is allowed to fail loudly: a malformed
//! or stale snapshot is dropped and the previous state is kept. This module makes
//! those drops observable. Instead of just logging with `tracing::warn!`,
//! anomalies are structured data that can be:
//!
//! - Logged via tracing (default behavior)
//! - Collected programmatically for testing
//! - Sent to a custom observer set on the session builder
//!
//! # Example
//!
//! ```
//! use battle_sync::telemetry::{ViolationSeverity, ViolationKind, CollectingObserver};
//! use std::sync::Arc;
//!
//! // Create a collecting observer for tests
//! let observer = Arc::new(CollectingObserver::new());
//!
//! // Check violations after some operations
//! assert!(observer.violations().is_empty(), "unexpected violations");
//! ```

use crate::battle::BattleId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a synchronization anomaly.
///
/// Severities are ordered from least to most severe, allowing filtering
/// and comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable - the event was dropped and prior state kept.
    ///
    /// Example: A stale snapshot delivered out of order.
    Warning,
    /// Serious issue - the server or transport sent something unusable.
    ///
    /// Example: A snapshot missing its `streamId`.
    Error,
    /// Critical invariant broken - held state may be corrupted.
    ///
    /// Example: A stored battle whose winner is not one of its participants.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of synchronization anomalies.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new categories may be
/// added in future versions. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// A wire snapshot failed validation at the subscription boundary.
    ///
    /// Examples:
    /// - Missing `id`, `streamId`, `status` or a participant
    /// - `winnerId` naming someone who is not in the battle
    MalformedSnapshot,
    /// A snapshot was older than the held state and was discarded.
    ///
    /// Examples:
    /// - Phase regression (`voting` after `completed`)
    /// - A sequence number that is not strictly greater than the held one
    StaleSnapshot,
    /// A snapshot tried to move a completed or cancelled battle.
    TerminalState,
    /// Countdown anomalies.
    ///
    /// Examples:
    /// - `startedAt` in the future by more than the battle duration
    Countdown,
    /// Transport subscription lifecycle issues.
    ///
    /// Examples:
    /// - A handler firing after it was released
    Subscription,
    /// Configuration conflicts between sessions.
    ///
    /// Examples:
    /// - A session changing the ordering policy of a store others share
    Configuration,
    /// Runtime invariant check failed.
    ///
    /// Only checked in debug builds or when the `paranoid` feature is enabled.
    Invariant,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedSnapshot => "malformed_snapshot",
            Self::StaleSnapshot => "stale_snapshot",
            Self::TerminalState => "terminal_state",
            Self::Countdown => "countdown",
            Self::Subscription => "subscription",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded synchronization anomaly.
///
/// # Serialization
///
/// This type implements `serde::Serialize` for structured JSON output.
///
/// # Example
///
/// ```
/// use battle_sync::telemetry::{SyncViolation, ViolationSeverity, ViolationKind};
/// use battle_sync::BattleId;
///
/// let violation = SyncViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::StaleSnapshot,
///     "phase regression",
///     "store.rs:42",
/// ).with_battle(BattleId::new("b-7"))
///  .with_context("held", "completed")
///  .with_context("incoming", "voting");
///
/// let json = serde_json::to_string(&violation).unwrap();
/// assert!(json.contains(r#""severity":"warning""#));
/// assert!(json.contains(r#""kind":"stale_snapshot""#));
/// assert!(json.contains(r#""battle":"b-7""#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncViolation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The category where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// The battle concerned, if known.
    pub battle: Option<BattleId>,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl SyncViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            battle: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the battle this violation concerns.
    #[must_use]
    pub fn with_battle(mut self, battle: BattleId) -> Self {
        self.battle = Some(battle);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for SyncViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(battle) = &self.battle {
            write!(f, ", battle={battle}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Trait for observing synchronization anomalies.
///
/// Observers are shared with transport callbacks, so they must be `Send + Sync`.
///
/// # Example
///
/// ```
/// use battle_sync::telemetry::{ViolationObserver, SyncViolation};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct CountingObserver(AtomicUsize);
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &SyncViolation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called when an anomaly is detected.
    ///
    /// This runs inside transport callbacks and should return quickly.
    fn on_violation(&self, violation: &SyncViolation);
}

/// Built-in observer that logs violations via the `tracing` crate.
///
/// # Log Levels
///
/// - `Warning` severity → `tracing::warn!`
/// - `Error` severity → `tracing::error!`
/// - `Critical` severity → `tracing::error!` with `severity = "critical"`
///
/// All fields are emitted as structured tracing fields (`severity`, `kind`,
/// `location`, `battle`, `context`), compatible with JSON log formatters.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SyncViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let battle = violation
            .battle
            .as_ref()
            .map_or("null", BattleId::as_str);

        let context_str = if violation.context.is_empty() {
            "{}".to_owned()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    battle,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    battle,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Critical => {
                tracing::error!(
                    severity = "critical",
                    kind,
                    location,
                    battle,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Built-in observer that collects violations for testing.
///
/// # Example
///
/// ```
/// use battle_sync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, SyncViolation, ViolationSeverity};
///
/// let observer = CollectingObserver::new();
///
/// observer.on_violation(&SyncViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::StaleSnapshot,
///     "test violation",
///     "test.rs:1",
/// ));
///
/// assert_eq!(observer.violations().len(), 1);
/// assert!(observer.has_violation(ViolationKind::StaleSnapshot));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<SyncViolation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<SyncViolation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Checks if any violation with the specified severity has been collected.
    #[must_use]
    pub fn has_severity(&self, severity: ViolationSeverity) -> bool {
        self.violations
            .lock()
            .iter()
            .any(|v| v.severity == severity)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<SyncViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears all collected violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SyncViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Macro for reporting violations with location tracking.
///
/// Creates a [`SyncViolation`] with the current file and line and logs it
/// through [`TracingObserver`].
///
/// # Syntax
///
/// ```text
/// report_violation!(severity, kind, "message");
/// report_violation!(severity, kind, "message with {}", format_args);
/// ```
///
/// # Example
///
/// ```
/// use battle_sync::{report_violation, telemetry::{ViolationSeverity, ViolationKind}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Countdown,
///     "start time {}s in the future", 30);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Asserts that no violations have been collected.
///
/// # Panics
///
/// Panics if the observer contains any violations, printing them for debugging.
///
/// # Example
///
/// ```
/// use battle_sync::{assert_no_violations, telemetry::CollectingObserver};
///
/// let observer = CollectingObserver::new();
/// assert_no_violations!(observer);
/// ```
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};

    ($observer:expr, $msg:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "{}\nExpected no violations, but found {}:\n{:#?}",
            $msg,
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a violation of the specified kind was collected.
///
/// # Panics
///
/// Panics if no violation of the specified kind was found.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};

    ($observer:expr, $kind:expr, $msg:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "{}\nExpected violation of kind {:?}, but found: {:#?}",
            $msg,
            $kind,
            $observer.violations()
        );
    }};
}

/// Reports a violation to an optional observer, falling back to [`TracingObserver`] if `None`.
///
/// # Example
///
/// ```
/// use battle_sync::telemetry::{
///     report_to_observer, CollectingObserver, SyncViolation, ViolationKind, ViolationSeverity
/// };
/// use std::sync::Arc;
///
/// let observer = Arc::new(CollectingObserver::new());
/// let violation = SyncViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::StaleSnapshot,
///     "test message",
///     "test.rs:1",
/// );
///
/// report_to_observer(Some(&observer), &violation);
/// assert_eq!(observer.len(), 1);
///
/// // Report with no observer (uses TracingObserver)
/// report_to_observer(None::<&Arc<CollectingObserver>>, &violation);
/// ```
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &SyncViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Macro for reporting violations through a session's observer.
///
/// Like [`report_violation!`], but with an `Option<Arc<dyn ViolationObserver>>`
/// as first argument. `None` falls back to [`TracingObserver`].
///
/// # Example
///
/// ```
/// use battle_sync::{report_violation_to, telemetry::{ViolationSeverity, ViolationKind, CollectingObserver, ViolationObserver}};
/// use std::sync::Arc;
///
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(Arc::new(CollectingObserver::new()));
///
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::StaleSnapshot,
///     "sequence {} not newer than {}", 3, 4);
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// Result of an invariant check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvariantViolation {
    /// Name of the type whose invariant was violated.
    pub type_name: &'static str,
    /// Description of the violated invariant.
    pub invariant: String,
    /// Additional diagnostic context.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Adds additional details to the violation.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Trait for types that maintain internal invariants.
///
/// Checked at runtime in debug builds or when the `paranoid` feature is enabled.
pub trait InvariantChecker {
    /// Checks that all invariants of this type are satisfied.
    ///
    /// Returns `Ok(())` if all invariants hold, or an `InvariantViolation`
    /// describing the first broken invariant.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Macro for conditionally checking invariants in debug builds.
///
/// Expands to an invariant check in debug builds but compiles to nothing in
/// release builds, unless the `paranoid` feature is enabled.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};

    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op version for release builds without `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
    ($expr:expr, $context:expr) => {{}};
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn test_violation_kind_as_str() {
        assert_eq!(
            ViolationKind::MalformedSnapshot.as_str(),
            "malformed_snapshot"
        );
        assert_eq!(ViolationKind::StaleSnapshot.as_str(), "stale_snapshot");
        assert_eq!(ViolationKind::TerminalState.as_str(), "terminal_state");
        assert_eq!(ViolationKind::Countdown.as_str(), "countdown");
        assert_eq!(ViolationKind::Subscription.as_str(), "subscription");
        assert_eq!(ViolationKind::Configuration.as_str(), "configuration");
        assert_eq!(ViolationKind::Invariant.as_str(), "invariant");
    }

    #[test]
    fn test_sync_violation_builder() {
        let violation = SyncViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::StaleSnapshot,
            "test message",
            "test.rs:42",
        )
        .with_battle(BattleId::new("b1"))
        .with_context("held", "voting")
        .with_context("incoming", "active");

        assert_eq!(violation.severity, ViolationSeverity::Warning);
        assert_eq!(violation.kind, ViolationKind::StaleSnapshot);
        assert_eq!(violation.message, "test message");
        assert_eq!(violation.location, "test.rs:42");
        assert_eq!(violation.battle, Some(BattleId::new("b1")));
        assert_eq!(violation.context.get("held"), Some(&"voting".to_owned()));
    }

    #[test]
    fn test_sync_violation_display() {
        let violation = SyncViolation::new(
            ViolationSeverity::Error,
            ViolationKind::MalformedSnapshot,
            "missing streamId",
            "test.rs:10",
        )
        .with_battle(BattleId::new("b9"));

        let display = violation.to_string();
        assert!(display.contains("error"));
        assert!(display.contains("malformed_snapshot"));
        assert!(display.contains("missing streamId"));
        assert!(display.contains("battle=b9"));
    }

    #[test]
    fn test_sync_violation_json_null_battle() {
        let violation = SyncViolation::new(
            ViolationSeverity::Error,
            ViolationKind::MalformedSnapshot,
            "no id",
            "test.rs:1",
        );
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains(r#""battle":null"#));
    }

    #[test]
    fn test_collecting_observer() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());

        observer.on_violation(&SyncViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::StaleSnapshot,
            "first",
            "test.rs:1",
        ));
        observer.on_violation(&SyncViolation::new(
            ViolationSeverity::Error,
            ViolationKind::MalformedSnapshot,
            "second",
            "test.rs:2",
        ));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::StaleSnapshot));
        assert!(observer.has_severity(ViolationSeverity::Error));
        assert!(!observer.has_violation(ViolationKind::Countdown));
        assert_eq!(
            observer
                .violations_of_kind(ViolationKind::MalformedSnapshot)
                .len(),
            1
        );

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn test_report_violation_to_with_observer() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        crate::report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::StaleSnapshot,
            "sequence {} <= {}",
            1,
            2
        );
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.violations()[0].message, "sequence 1 <= 2");
    }

    #[test]
    fn test_invariant_violation_display() {
        let violation = InvariantViolation::new("Battle", "winner must be a participant")
            .with_details("winner_id=x");
        assert_eq!(
            violation.to_string(),
            "Battle: winner must be a participant (winner_id=x)"
        );
    }
}
