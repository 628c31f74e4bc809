//! [`LifecycleGuard`] – advertise on mount, stop-then-withdraw on teardown.
//!
//! ```text
//!  Uninitialized ──activate──▶ Active ──teardown──▶ TornDown (terminal)
//!        │                                              ▲
//!        └──────────────── teardown ────────────────────┘
//! ```
//!
//! Teardown of an `Active` surface always runs in this order:
//!
//! 1. cancel the pending throttled send and every hold timer,
//! 2. if the last state sent was not neutral, publish neutral once,
//! 3. unadvertise the topic.
//!
//! The guard does not own the pipeline; it drives it through the
//! [`GuardedPipeline`] trait so the transitions can be checked against a mock.

use std::fmt;

use teleop_types::TeleopError;
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// Topic not (yet) advertised; inputs are dropped.
    #[default]
    Uninitialized,
    /// Topic advertised; commands flow.
    Active,
    /// Terminal.  A remount builds a fresh surface.
    TornDown,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Uninitialized => write!(f, "uninitialized"),
            LifecyclePhase::Active => write!(f, "active"),
            LifecyclePhase::TornDown => write!(f, "torn-down"),
        }
    }
}

/// Why a surface is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    Unmount,
    Disconnected,
}

/// What a teardown actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub reason: TeardownReason,
    /// A neutral command was published during teardown.
    pub flushed: bool,
    /// The topic was withdrawn without error.
    pub unadvertised: bool,
}

/// The operations the guard needs from a command pipeline.
pub trait GuardedPipeline {
    fn advertise(&mut self) -> Result<(), TeleopError>;

    fn unadvertise(&mut self) -> Result<(), TeleopError>;

    /// Drop the pending throttled payload and stop every hold timer.
    fn cancel_pending(&mut self);

    /// Publish an all-neutral command immediately, bypassing the throttle.
    fn flush_neutral(&mut self) -> Result<(), TeleopError>;

    /// `true` when nothing was sent yet or the last send was neutral.
    fn last_sent_is_neutral(&self) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// LifecycleGuard
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LifecycleGuard {
    surface: String,
    phase: LifecyclePhase,
}

impl LifecycleGuard {
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            phase: LifecyclePhase::Uninitialized,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == LifecyclePhase::Active
    }

    /// `Uninitialized → Active` by advertising the pipeline's topic.
    ///
    /// Calling it on an `Active` guard is a no-op.  On failure the guard
    /// stays `Uninitialized` so the caller can retry once the transport
    /// reconnects.
    ///
    /// # Errors
    ///
    /// * the advertise error, unchanged;
    /// * [`TeleopError::InvalidTransition`] on a torn-down guard.
    pub fn activate<P>(&mut self, pipeline: &mut P) -> Result<(), TeleopError>
    where
        P: GuardedPipeline + ?Sized,
    {
        match self.phase {
            LifecyclePhase::Active => Ok(()),
            LifecyclePhase::TornDown => Err(TeleopError::InvalidTransition(format!(
                "surface '{}' is torn down and cannot be activated",
                self.surface
            ))),
            LifecyclePhase::Uninitialized => {
                if let Err(e) = pipeline.advertise() {
                    warn!(surface = %self.surface, error = %e, "advertise failed; staying uninitialized");
                    return Err(e);
                }
                self.phase = LifecyclePhase::Active;
                info!(surface = %self.surface, "surface active");
                Ok(())
            }
        }
    }

    /// Move to `TornDown`, stopping the robot first if it may be moving.
    ///
    /// Flush and unadvertise failures are logged, not returned: the guard
    /// always ends up `TornDown`.
    ///
    /// # Errors
    ///
    /// [`TeleopError::InvalidTransition`] when already torn down.
    pub fn teardown<P>(&mut self, pipeline: &mut P, reason: TeardownReason) -> Result<TeardownReport, TeleopError>
    where
        P: GuardedPipeline + ?Sized,
    {
        let previous = self.phase;
        if previous == LifecyclePhase::TornDown {
            return Err(TeleopError::InvalidTransition(format!(
                "surface '{}' is already torn down",
                self.surface
            )));
        }

        pipeline.cancel_pending();
        self.phase = LifecyclePhase::TornDown;

        let mut report = TeardownReport {
            reason,
            flushed: false,
            unadvertised: false,
        };
        if previous == LifecyclePhase::Uninitialized {
            info!(surface = %self.surface, ?reason, "surface torn down before activation");
            return Ok(report);
        }

        if !pipeline.last_sent_is_neutral() {
            match pipeline.flush_neutral() {
                Ok(()) => report.flushed = true,
                Err(e) => warn!(surface = %self.surface, error = %e, "neutral flush failed during teardown"),
            }
        }
        match pipeline.unadvertise() {
            Ok(()) => report.unadvertised = true,
            Err(e) => warn!(surface = %self.surface, error = %e, "unadvertise failed during teardown"),
        }
        info!(surface = %self.surface, ?reason, flushed = report.flushed, "surface torn down");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockPipeline {
        calls: Vec<&'static str>,
        moving: bool,
        fail_advertise: bool,
        fail_flush: bool,
    }

    impl GuardedPipeline for MockPipeline {
        fn advertise(&mut self) -> Result<(), TeleopError> {
            self.calls.push("advertise");
            if self.fail_advertise {
                return Err(TeleopError::TransportNotReady("mock".to_string()));
            }
            Ok(())
        }

        fn unadvertise(&mut self) -> Result<(), TeleopError> {
            self.calls.push("unadvertise");
            Ok(())
        }

        fn cancel_pending(&mut self) {
            self.calls.push("cancel");
        }

        fn flush_neutral(&mut self) -> Result<(), TeleopError> {
            self.calls.push("flush");
            if self.fail_flush {
                return Err(TeleopError::TransportNotReady("mock".to_string()));
            }
            self.moving = false;
            Ok(())
        }

        fn last_sent_is_neutral(&self) -> bool {
            !self.moving
        }
    }

    #[test]
    fn activate_advertises_once() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.activate(&mut p).unwrap();
        guard.activate(&mut p).unwrap();
        assert_eq!(guard.phase(), LifecyclePhase::Active);
        assert_eq!(p.calls, vec!["advertise"]);
    }

    #[test]
    fn failed_advertise_stays_uninitialized_and_can_retry() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline {
            fail_advertise: true,
            ..Default::default()
        };
        assert!(guard.activate(&mut p).is_err());
        assert_eq!(guard.phase(), LifecyclePhase::Uninitialized);

        p.fail_advertise = false;
        guard.activate(&mut p).unwrap();
        assert!(guard.is_active());
    }

    #[test]
    fn moving_teardown_flushes_before_unadvertise() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.activate(&mut p).unwrap();
        p.moving = true;

        let report = guard.teardown(&mut p, TeardownReason::Unmount).unwrap();
        assert!(report.flushed);
        assert!(report.unadvertised);
        assert_eq!(p.calls, vec!["advertise", "cancel", "flush", "unadvertise"]);
        assert_eq!(guard.phase(), LifecyclePhase::TornDown);
    }

    #[test]
    fn neutral_teardown_skips_flush() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.activate(&mut p).unwrap();

        let report = guard.teardown(&mut p, TeardownReason::Unmount).unwrap();
        assert!(!report.flushed);
        assert_eq!(p.calls, vec!["advertise", "cancel", "unadvertise"]);
    }

    #[test]
    fn failed_flush_still_tears_down() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.activate(&mut p).unwrap();
        p.moving = true;
        p.fail_flush = true;

        let report = guard.teardown(&mut p, TeardownReason::Disconnected).unwrap();
        assert!(!report.flushed);
        assert_eq!(report.reason, TeardownReason::Disconnected);
        assert_eq!(guard.phase(), LifecyclePhase::TornDown);
        assert_eq!(p.calls.last(), Some(&"unadvertise"));
    }

    #[test]
    fn uninitialized_teardown_never_touches_topic() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.teardown(&mut p, TeardownReason::Unmount).unwrap();
        assert_eq!(p.calls, vec!["cancel"]);
    }

    #[test]
    fn torn_down_is_terminal() {
        let mut guard = LifecycleGuard::new("pad");
        let mut p = MockPipeline::default();
        guard.activate(&mut p).unwrap();
        guard.teardown(&mut p, TeardownReason::Unmount).unwrap();

        assert!(matches!(
            guard.teardown(&mut p, TeardownReason::Unmount),
            Err(TeleopError::InvalidTransition(_))
        ));
        assert!(matches!(
            guard.activate(&mut p),
            Err(TeleopError::InvalidTransition(_))
        ));
    }
}
