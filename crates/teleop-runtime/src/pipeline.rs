//! [`CommandPipeline`] – one surface's mapper, state, throttle, hold driver
//! and publisher wired together.
//!
//! All methods take the current instant and run to completion; the surface
//! actor is the only caller and the only place that sleeps.

use std::collections::BTreeMap;
use std::sync::Arc;

use teleop_kernel::{GuardedPipeline, HoldDriver, Throttle};
use teleop_middleware::{Publisher, Transport};
use teleop_types::{CommandChannel, CommandState, PartialCommand, PointerSample, ReferenceFrame, SpeedMode, TeleopError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::mapper::{MapperPolicy, map_button, map_stick};
use crate::surfaces::{ControlBinding, STOP_PHRASES, SurfaceDefinition, SurfaceSettings};

pub struct CommandPipeline {
    definition: SurfaceDefinition,
    policy: MapperPolicy,
    state: CommandState,
    throttle: Throttle,
    holds: HoldDriver,
    publisher: Publisher,
    /// Controls currently down, with the channels each one wrote.
    pressed: BTreeMap<String, Vec<CommandChannel>>,
    /// Control latched by the last voice phrase.
    latched: Option<String>,
}

impl CommandPipeline {
    pub fn new(settings: &SurfaceSettings, transport: Arc<dyn Transport>) -> Result<Self, TeleopError> {
        let definition = settings.build()?;
        let publisher = Publisher::new(transport, definition.topic.clone(), definition.layout.clone());
        Ok(Self {
            state: definition.layout.neutral_state(),
            policy: settings.policy(),
            throttle: Throttle::new(settings.throttle_window()),
            holds: HoldDriver::new(settings.hold_interval()),
            publisher,
            definition,
            pressed: BTreeMap::new(),
            latched: None,
        })
    }

    pub fn definition(&self) -> &SurfaceDefinition {
        &self.definition
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn policy(&self) -> &MapperPolicy {
        &self.policy
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Controls currently held down, in order.
    pub fn held(&self) -> Vec<String> {
        self.pressed.keys().cloned().collect()
    }

    pub fn latched(&self) -> Option<&str> {
        self.latched.as_deref()
    }

    /// Earliest instant at which [`on_deadline`][Self::on_deadline] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.throttle.deadline(), self.holds.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Pointer moved on a stick.  The first move of a gesture marks the
    /// stick as down and starts its hold, so a deflected stick keeps
    /// resending without further moves.
    pub fn move_stick(&mut self, control: &str, sample: &PointerSample, now: Instant) -> Result<(), TeleopError> {
        let ControlBinding::Stick(routes) = self.definition.binding(control)? else {
            return Err(TeleopError::UnknownControl(format!("'{control}' is not a stick")));
        };
        let partial = map_stick(sample, routes, &self.policy)?;
        // Later moves must not push the next tick back.
        if self
            .pressed
            .insert(control.to_string(), partial.channels().collect())
            .is_none()
        {
            self.holds.start(control, now);
        }
        self.merge(&partial);
        self.schedule(now);
        Ok(())
    }

    /// Button went down.  Pressing a held button restarts its hold.
    pub fn press(&mut self, control: &str, now: Instant) -> Result<(), TeleopError> {
        let ControlBinding::Button(route) = self.definition.binding(control)? else {
            return Err(TeleopError::UnknownControl(format!("'{control}' is not a button")));
        };
        let partial = map_button(route, &self.policy);
        if let Some(previous) = self.pressed.insert(control.to_string(), partial.channels().collect()) {
            // The frame may have changed since the first press.
            self.state.zero(previous);
        }
        self.merge(&partial);
        self.holds.start(control, now);
        self.schedule(now);
        Ok(())
    }

    /// Control released.  Returns `false` for a control that was not down,
    /// which makes a repeated release a no-op.
    ///
    /// The released channels are zeroed and the state is flushed
    /// immediately, bypassing the throttle window.
    pub fn release(&mut self, control: &str, now: Instant) -> Result<bool, TeleopError> {
        self.definition.binding(control)?;
        let Some(channels) = self.pressed.remove(control) else {
            return Ok(false);
        };
        self.holds.stop(control);
        if self.latched.as_deref() == Some(control) {
            self.latched = None;
        }
        self.state.zero(channels);
        self.flush(now);
        Ok(true)
    }

    /// Pointer left the control.  Treated as a release while it is down.
    pub fn leave(&mut self, control: &str, now: Instant) -> Result<bool, TeleopError> {
        self.release(control, now)
    }

    /// Release every control that is down.  Flushes only when something was.
    pub fn release_all(&mut self, now: Instant) -> bool {
        if self.pressed.is_empty() {
            return false;
        }
        self.holds.stop_all();
        self.latched = None;
        for (_, channels) in std::mem::take(&mut self.pressed) {
            self.state.zero(channels);
        }
        self.flush(now);
        true
    }

    /// Voice input.  A known phrase latches its control until another phrase
    /// replaces it; a stop phrase releases everything.
    pub fn phrase(&mut self, phrase: &str, now: Instant) -> Result<(), TeleopError> {
        let normalized = phrase.trim().to_ascii_lowercase();
        if STOP_PHRASES.contains(&normalized.as_str()) {
            self.release_all(now);
            return Ok(());
        }
        let control = self
            .definition
            .phrase_control(&normalized)
            .map(str::to_string)
            .ok_or_else(|| TeleopError::UnknownControl(format!("phrase '{normalized}'")))?;

        if let Some(previous) = self.latched.take().filter(|p| *p != control) {
            self.holds.stop(&previous);
            if let Some(channels) = self.pressed.remove(&previous) {
                self.state.zero(channels);
            }
        }
        self.press(&control, now)?;
        self.latched = Some(control);
        Ok(())
    }

    /// Never publishes; the next contribution picks the new multiplier up.
    pub fn set_speed_mode(&mut self, mode: SpeedMode) {
        self.policy.speed_mode = mode;
    }

    /// Never publishes; held buttons keep their channels until released.
    pub fn set_frame(&mut self, frame: ReferenceFrame) {
        self.policy.frame = frame;
    }

    // ── Timers ───────────────────────────────────────────────────────────

    /// Run the throttle's trailing edge and any due hold resends.
    pub fn on_deadline(&mut self, now: Instant) {
        if let Some(due) = self.throttle.poll(now) {
            self.send(&due);
        }
        let fired = self.holds.fire_due(now);
        if !fired.is_empty() {
            debug!(controls = ?fired, "hold resend");
            self.schedule(now);
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn merge(&mut self, partial: &PartialCommand) {
        let ignored = self.state.merge(partial);
        if !ignored.is_empty() {
            warn!(topic = %self.definition.topic, channels = ?ignored, "channels outside layout ignored");
        }
    }

    fn schedule(&mut self, now: Instant) {
        if let Some(state) = self.throttle.schedule(&self.state, now) {
            self.send(&state);
        }
    }

    fn flush(&mut self, now: Instant) {
        let state = self.throttle.flush(&self.state, now);
        self.send(&state);
    }

    fn send(&mut self, state: &CommandState) {
        if let Err(e) = self.publisher.publish(state) {
            warn!(topic = %self.definition.topic, error = %e, "publish dropped");
        }
    }
}

impl GuardedPipeline for CommandPipeline {
    fn advertise(&mut self) -> Result<(), TeleopError> {
        self.publisher.advertise()
    }

    fn unadvertise(&mut self) -> Result<(), TeleopError> {
        self.publisher.unadvertise()
    }

    fn cancel_pending(&mut self) {
        self.throttle.cancel();
        self.holds.stop_all();
        self.pressed.clear();
        self.latched = None;
    }

    fn flush_neutral(&mut self) -> Result<(), TeleopError> {
        self.state.reset();
        let state = self.throttle.flush(&self.state, Instant::now());
        self.publisher.publish(&state)
    }

    fn last_sent_is_neutral(&self) -> bool {
        self.publisher.last_sent_is_neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surfaces::SurfaceKind;
    use std::time::Duration;
    use teleop_kernel::{LifecycleGuard, TeardownReason};
    use teleop_middleware::{SimFrame, SimTransport};

    fn active(kind: SurfaceKind) -> (CommandPipeline, Arc<SimTransport>) {
        let sim = Arc::new(SimTransport::default());
        let mut pipeline = CommandPipeline::new(&SurfaceSettings::new(kind), sim.clone()).unwrap();
        pipeline.advertise().unwrap();
        (pipeline, sim)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn two_sticks_never_clobber_each_other() {
        let (mut p, _sim) = active(SurfaceKind::DualJoystick);
        let t0 = Instant::now();
        p.move_stick("left_stick", &PointerSample::normalized(0.0, -1.0), t0).unwrap();
        p.move_stick("right_stick", &PointerSample::normalized(1.0, 0.0), t0 + ms(5)).unwrap();
        p.move_stick("left_stick", &PointerSample::normalized(0.0, -0.5), t0 + ms(10)).unwrap();

        assert!(p.state().get(CommandChannel::LINEAR_X).unwrap() > 0.0);
        assert!(p.state().get(CommandChannel::ANGULAR_Z).unwrap() < 0.0);
    }

    #[test]
    fn stick_release_zeroes_both_axes_and_flushes() {
        let (mut p, sim) = active(SurfaceKind::DualJoystick);
        let t0 = Instant::now();
        p.move_stick("left_stick", &PointerSample::normalized(-1.0, -1.0), t0).unwrap();
        p.move_stick("right_stick", &PointerSample::normalized(1.0, 0.0), t0 + ms(1)).unwrap();
        assert!(p.release("left_stick", t0 + ms(2)).unwrap());

        assert_eq!(p.state().get(CommandChannel::LINEAR_X), Some(0.0));
        assert_eq!(p.state().get(CommandChannel::LINEAR_Y), Some(0.0));
        assert!(p.state().get(CommandChannel::ANGULAR_Z).unwrap() != 0.0);
        // Leading publish plus the release flush; the right stick is still
        // held, so only its hold tick remains.
        assert_eq!(sim.publishes().len(), 2);
        assert_eq!(p.held(), vec!["right_stick".to_string()]);
        assert_eq!(p.next_deadline(), Some(t0 + ms(101)));
    }

    #[test]
    fn held_stick_resends_without_new_moves() {
        let (mut p, sim) = active(SurfaceKind::DualJoystick);
        let t0 = Instant::now();
        p.move_stick("left_stick", &PointerSample::normalized(0.0, -1.0), t0).unwrap();
        assert_eq!(p.next_deadline(), Some(t0 + ms(100)));

        // Further moves keep the original cadence.
        p.move_stick("left_stick", &PointerSample::normalized(0.0, -0.8), t0 + ms(30)).unwrap();
        p.on_deadline(t0 + ms(100));
        assert_eq!(sim.publishes().len(), 2);
        p.on_deadline(t0 + ms(200));
        p.on_deadline(t0 + ms(300));
        assert_eq!(sim.publishes().len(), 4);

        assert!(p.release("left_stick", t0 + ms(310)).unwrap());
        assert_eq!(p.next_deadline(), None);
        assert!(p.publisher().last_sent_is_neutral());
    }

    #[test]
    fn duplicate_release_is_ignored() {
        let (mut p, sim) = active(SurfaceKind::Drone);
        let t0 = Instant::now();
        p.press("forward", t0).unwrap();
        assert!(p.release("forward", t0 + ms(10)).unwrap());
        assert!(!p.release("forward", t0 + ms(20)).unwrap());
        assert!(!p.leave("forward", t0 + ms(30)).unwrap());
        assert_eq!(sim.publishes().len(), 2);
    }

    #[test]
    fn unknown_and_mismatched_controls_are_rejected() {
        let (mut p, _sim) = active(SurfaceKind::Drone);
        let now = Instant::now();
        assert!(matches!(p.press("jump", now), Err(TeleopError::UnknownControl(_))));
        assert!(matches!(p.press("stick", now), Err(TeleopError::UnknownControl(_))));
        assert!(matches!(
            p.move_stick("forward", &PointerSample::normalized(0.0, 0.0), now),
            Err(TeleopError::UnknownControl(_))
        ));
    }

    #[test]
    fn invalid_sample_leaves_state_untouched() {
        let (mut p, sim) = active(SurfaceKind::DualJoystick);
        let bad = PointerSample { x: None, y: Some(1.0), size: Some(1.0) };
        assert!(p.move_stick("left_stick", &bad, Instant::now()).is_err());
        assert!(p.state().is_neutral());
        assert!(p.held().is_empty());
        assert!(sim.publishes().is_empty());
    }

    #[test]
    fn hold_resends_through_throttle() {
        let (mut p, sim) = active(SurfaceKind::Drone);
        let t0 = Instant::now();
        p.press("forward", t0).unwrap();
        assert_eq!(p.next_deadline(), Some(t0 + ms(100)));
        p.on_deadline(t0 + ms(100));
        p.on_deadline(t0 + ms(200));
        assert_eq!(sim.publishes().len(), 3);
    }

    #[test]
    fn speed_mode_change_does_not_publish() {
        let (mut p, sim) = active(SurfaceKind::Drone);
        p.set_speed_mode(SpeedMode::Fast);
        p.set_frame(ReferenceFrame::Tool);
        assert!(sim.publishes().is_empty());

        p.press("forward", Instant::now()).unwrap();
        assert_eq!(p.state().get(CommandChannel::LINEAR_X), Some(0.5));
    }

    #[test]
    fn phrases_latch_until_replaced_or_stopped() {
        let (mut p, sim) = active(SurfaceKind::Voice);
        let t0 = Instant::now();
        p.phrase("forward", t0).unwrap();
        assert_eq!(p.latched(), Some("forward"));

        p.phrase("Turn Left", t0 + ms(150)).unwrap();
        assert_eq!(p.latched(), Some("left"));
        assert_eq!(p.state().get(CommandChannel::LINEAR_X), Some(0.0));
        assert!(p.state().get(CommandChannel::ANGULAR_Z).unwrap() > 0.0);
        assert_eq!(p.held(), vec!["left".to_string()]);

        p.phrase("stop", t0 + ms(160)).unwrap();
        assert!(p.state().is_neutral());
        assert!(p.publisher().last_sent_is_neutral());
        assert_eq!(p.next_deadline(), None);
        assert!(sim.publishes().len() >= 3);

        assert!(matches!(p.phrase("dance", t0), Err(TeleopError::UnknownControl(_))));
    }

    #[test]
    fn stop_phrase_when_idle_publishes_nothing() {
        let (mut p, sim) = active(SurfaceKind::Voice);
        p.phrase("stop", Instant::now()).unwrap();
        assert!(sim.publishes().is_empty());
    }

    #[test]
    fn guard_teardown_flushes_exactly_once_before_unadvertise() {
        let (mut p, sim) = active(SurfaceKind::Drone);
        let mut guard = LifecycleGuard::new("drone");
        guard.activate(&mut p).unwrap();
        let t0 = Instant::now();
        p.press("forward", t0).unwrap();
        p.press("left", t0 + ms(10)).unwrap();

        let report = guard.teardown(&mut p, TeardownReason::Unmount).unwrap();
        assert!(report.flushed);

        let frames = sim.frames();
        let neutral_publishes = frames
            .iter()
            .filter(|f| matches!(&f.frame, SimFrame::Publish { message, .. } if message["linear"]["x"] == 0.0 && message["linear"]["y"] == 0.0))
            .count();
        assert_eq!(neutral_publishes, 1);
        assert!(matches!(frames.last().unwrap().frame, SimFrame::Unadvertise { .. }));
        assert_eq!(p.next_deadline(), None);
    }
}
