//! [`HoldDriver`] – repeating resend deadlines for held controls.
//!
//! A held button must keep the robot moving even though the operator produces
//! no new input.  The driver keeps one deadline per held control id; the
//! owning loop sleeps until [`next_deadline`][HoldDriver::next_deadline] and
//! then calls [`fire_due`][HoldDriver::fire_due], resubmitting the latest
//! command state through the throttle when anything fired.
//!
//! Ticks are phase-locked to the press (`start + k * interval`).  A loop that
//! wakes late fires each overdue control once and re-arms it one interval
//! after the late wake-up instead of replaying the missed ticks.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct HoldTimer {
    next: Instant,
}

#[derive(Debug, Clone)]
pub struct HoldDriver {
    interval: Duration,
    timers: BTreeMap<String, HoldTimer>,
}

impl HoldDriver {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timers: BTreeMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin holding `control`; the first resend is due one interval from
    /// `now`.
    ///
    /// Starting a control that is already held replaces its timer.  Returns
    /// `true` when an existing hold was replaced.
    pub fn start(&mut self, control: &str, now: Instant) -> bool {
        let replaced = self
            .timers
            .insert(
                control.to_string(),
                HoldTimer {
                    next: now + self.interval,
                },
            )
            .is_some();
        debug!(control, replaced, "hold started");
        replaced
    }

    /// Stop holding `control`.  Idempotent; returns whether it was held.
    pub fn stop(&mut self, control: &str) -> bool {
        let was_held = self.timers.remove(control).is_some();
        if was_held {
            debug!(control, "hold stopped");
        }
        was_held
    }

    /// Stop every hold.  Returns how many were active.
    pub fn stop_all(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    pub fn is_holding(&self, control: &str) -> bool {
        self.timers.contains_key(control)
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Ids of every held control, in order.
    pub fn held(&self) -> impl Iterator<Item = &str> {
        self.timers.keys().map(String::as_str)
    }

    /// Earliest resend deadline across all held controls.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.next).min()
    }

    /// Advance every timer whose deadline is `<= now` and return the ids that
    /// fired.  Each control fires at most once per call.
    pub fn fire_due(&mut self, now: Instant) -> Vec<String> {
        let mut fired = Vec::new();
        for (control, timer) in &mut self.timers {
            if timer.next > now {
                continue;
            }
            timer.next += self.interval;
            if timer.next <= now {
                timer.next = now + self.interval;
            }
            fired.push(control.clone());
        }
        fired
    }
}
