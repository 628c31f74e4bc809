//! [`Throttle`] – leading + trailing edge rate limiter.
//!
//! * The first [`schedule`][Throttle::schedule] outside a window is returned
//!   for immediate publish and opens a new window.
//! * Inside a window the state is parked as the single pending payload.  A
//!   newer state overwrites it; nothing is ever queued.
//! * When the window ends the owning loop calls [`poll`][Throttle::poll],
//!   which releases the pending payload once and restarts the window at that
//!   instant.
//! * [`flush`][Throttle::flush] bypasses the window (used for stop commands)
//!   and [`cancel`][Throttle::cancel] drops the pending payload.
//!
//! The throttle never publishes by itself; every method hands back the state
//! the caller must send, which keeps it free of I/O and trivially testable.

use std::time::Duration;

use teleop_types::CommandState;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    window_start: Option<Instant>,
    pending: Option<CommandState>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            pending: None,
        }
    }

    /// Minimum interval between two throttled publishes.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Instant of the last publish that went through the throttle.
    pub fn window_start(&self) -> Option<Instant> {
        self.window_start
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn in_window(&self, now: Instant) -> bool {
        matches!(self.window_start, Some(start) if now < start + self.window)
    }

    /// Offer `state` for publishing.
    ///
    /// Returns `Some(state)` when it must be published right now (leading
    /// edge), `None` when it was parked as the trailing payload.
    pub fn schedule(&mut self, state: &CommandState, now: Instant) -> Option<CommandState> {
        if self.in_window(now) {
            self.pending = Some(state.clone());
            return None;
        }
        self.window_start = Some(now);
        self.pending = None;
        Some(state.clone())
    }

    /// When the pending payload becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        self.window_start.map(|start| start + self.window)
    }

    /// Release the trailing payload if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<CommandState> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.window_start = Some(now);
        self.pending.take()
    }

    /// Publish `state` immediately regardless of the window.
    ///
    /// Clears the pending payload and restarts the window at `now`.
    pub fn flush(&mut self, state: &CommandState, now: Instant) -> CommandState {
        self.pending = None;
        self.window_start = Some(now);
        state.clone()
    }

    /// Drop the pending payload.  Returns whether one was dropped.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
