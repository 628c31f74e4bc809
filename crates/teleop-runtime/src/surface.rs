//! Control-surface actor.
//!
//! Each mounted surface is one Tokio task owning its [`CommandPipeline`] and
//! [`LifecycleGuard`].  Input events, the connection state, and the pipeline's
//! next deadline are branches of a single `select!` loop, so every mutation
//! happens on one execution context and nothing ever blocks.
//!
//! The host talks to the task through a [`SurfaceHandle`]:
//!
//! * [`send`][SurfaceHandle::send] – fire-and-forget input events,
//! * [`snapshot`][SurfaceHandle::snapshot] /
//!   [`subscribe`][SurfaceHandle::subscribe] – read-only view for the UI,
//! * [`unmount`][SurfaceHandle::unmount] – tear down and wait for the final
//!   stop to be sent.  Dropping the handle has the same effect without the
//!   wait.

use std::sync::Arc;

use teleop_kernel::{LifecycleGuard, LifecyclePhase, TeardownReason, TeardownReport};
use teleop_middleware::Transport;
use teleop_types::{CommandState, PointerSample, ReferenceFrame, SpeedMode, TeleopError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::pipeline::CommandPipeline;
use crate::surfaces::{SurfaceKind, SurfaceSettings};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Input the host forwards to a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// Pointer moved on a stick (widget units).
    Move { control: String, sample: PointerSample },
    Press { control: String },
    Release { control: String },
    /// Pointer left the control; a release if it was down.
    Leave { control: String },
    /// Recognised speech.
    Phrase(String),
    SetSpeedMode(SpeedMode),
    CycleSpeedMode,
    SetReferenceFrame(ReferenceFrame),
}

/// Read-only view of a surface for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSnapshot {
    pub kind: SurfaceKind,
    pub topic: String,
    pub phase: LifecyclePhase,
    pub connected: bool,
    pub speed_mode: SpeedMode,
    pub frame: ReferenceFrame,
    pub state: CommandState,
    pub held: Vec<String>,
    pub published: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

pub struct SurfaceHandle {
    events: Option<mpsc::UnboundedSender<SurfaceEvent>>,
    snapshot: watch::Receiver<SurfaceSnapshot>,
    task: Option<JoinHandle<Option<TeardownReport>>>,
}

impl SurfaceHandle {
    /// Build the pipeline for `settings` and start its actor.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TeleopError::Config`] when the settings are invalid.
    pub fn spawn(settings: &SurfaceSettings, transport: Arc<dyn Transport>) -> Result<Self, TeleopError> {
        let pipeline = CommandPipeline::new(settings, Arc::clone(&transport))?;
        let guard = LifecycleGuard::new(settings.kind.to_string());
        let connection = transport.connection();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = SurfaceActor {
            pipeline,
            guard,
            events: events_rx,
            connection,
            snapshot: watch::Sender::new(empty_snapshot(settings)),
        };
        let snapshot = actor.snapshot.subscribe();
        let task = tokio::spawn(actor.run());

        Ok(Self {
            events: Some(events_tx),
            snapshot,
            task: Some(task),
        })
    }

    /// Queue an input event.
    ///
    /// # Errors
    ///
    /// [`TeleopError::Channel`] once the surface has torn down.
    pub fn send(&self, event: SurfaceEvent) -> Result<(), TeleopError> {
        let Some(events) = &self.events else {
            return Err(TeleopError::Channel("surface unmounted".to_string()));
        };
        events
            .send(event)
            .map_err(|_| TeleopError::Channel("surface torn down".to_string()))
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.snapshot.clone()
    }

    /// Tear the surface down and wait until the final stop has been handed to
    /// the transport.  Events queued before the call are still applied.
    ///
    /// Returns `None` when the surface had already torn down on its own
    /// without producing a report.
    pub async fn unmount(mut self) -> Result<Option<TeardownReport>, TeleopError> {
        self.events.take();
        let Some(task) = self.task.take() else {
            return Ok(None);
        };
        task.await
            .map_err(|e| TeleopError::Channel(format!("surface task failed: {e}")))
    }
}

fn empty_snapshot(settings: &SurfaceSettings) -> SurfaceSnapshot {
    SurfaceSnapshot {
        kind: settings.kind,
        topic: String::new(),
        phase: LifecyclePhase::Uninitialized,
        connected: false,
        speed_mode: settings.speed_mode,
        frame: settings.frame,
        state: CommandState::neutral([]),
        held: Vec::new(),
        published: 0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actor
// ────────────────────────────────────────────────────────────────────────────

struct SurfaceActor {
    pipeline: CommandPipeline,
    guard: LifecycleGuard,
    events: mpsc::UnboundedReceiver<SurfaceEvent>,
    connection: watch::Receiver<bool>,
    snapshot: watch::Sender<SurfaceSnapshot>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl SurfaceActor {
    async fn run(mut self) -> Option<TeardownReport> {
        if *self.connection.borrow_and_update() {
            self.try_activate();
        } else {
            info!(surface = %self.pipeline.definition().kind, "transport not connected; waiting");
        }
        self.publish_snapshot();

        let reason = loop {
            let deadline = self.pipeline.next_deadline();
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break TeardownReason::Unmount,
                },
                changed = self.connection.changed() => {
                    // A dropped sender means the transport is gone for good.
                    let connected = changed.is_ok() && *self.connection.borrow_and_update();
                    if connected {
                        self.try_activate();
                    } else if self.guard.is_active() || changed.is_err() {
                        break TeardownReason::Disconnected;
                    }
                }
                _ = wait_until(deadline) => {
                    if self.guard.is_active() {
                        self.pipeline.on_deadline(Instant::now());
                    }
                }
            }
            self.publish_snapshot();
        };

        let report = match self.guard.teardown(&mut self.pipeline, reason) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "teardown failed");
                None
            }
        };
        self.publish_snapshot();
        report
    }

    fn try_activate(&mut self) {
        if let Err(e) = self.guard.activate(&mut self.pipeline) {
            debug!(error = %e, "activation deferred until reconnect");
        }
    }

    fn handle(&mut self, event: SurfaceEvent) {
        let now = Instant::now();
        let result = match event {
            SurfaceEvent::SetSpeedMode(mode) => {
                self.pipeline.set_speed_mode(mode);
                Ok(())
            }
            SurfaceEvent::CycleSpeedMode => {
                let next = self.pipeline.policy().speed_mode.next();
                self.pipeline.set_speed_mode(next);
                Ok(())
            }
            SurfaceEvent::SetReferenceFrame(frame) => {
                self.pipeline.set_frame(frame);
                Ok(())
            }
            _ if !self.guard.is_active() => {
                debug!(?event, phase = %self.guard.phase(), "input dropped while inactive");
                Ok(())
            }
            SurfaceEvent::Move { control, sample } => self.pipeline.move_stick(&control, &sample, now),
            SurfaceEvent::Press { control } => self.pipeline.press(&control, now),
            SurfaceEvent::Release { control } => self.pipeline.release(&control, now).map(|_| ()),
            SurfaceEvent::Leave { control } => self.pipeline.leave(&control, now).map(|_| ()),
            SurfaceEvent::Phrase(phrase) => self.pipeline.phrase(&phrase, now),
        };
        if let Err(e) = result {
            warn!(surface = %self.pipeline.definition().kind, error = %e, "input rejected");
        }
    }

    fn publish_snapshot(&self) {
        let policy = self.pipeline.policy();
        self.snapshot.send_replace(SurfaceSnapshot {
            kind: self.pipeline.definition().kind,
            topic: self.pipeline.definition().topic.clone(),
            phase: self.guard.phase(),
            connected: *self.connection.borrow(),
            speed_mode: policy.speed_mode,
            frame: policy.frame,
            state: self.pipeline.state().clone(),
            held: self.pipeline.held(),
            published: self.pipeline.publisher().published(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use teleop_middleware::{SimFrame, SimTransport};
    use teleop_types::CommandChannel;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn mount(kind: SurfaceKind, sim: &Arc<SimTransport>) -> SurfaceHandle {
        SurfaceHandle::spawn(&SurfaceSettings::new(kind), sim.clone()).unwrap()
    }

    fn press(control: &str) -> SurfaceEvent {
        SurfaceEvent::Press { control: control.to_string() }
    }

    fn release(control: &str) -> SurfaceEvent {
        SurfaceEvent::Release { control: control.to_string() }
    }

    fn stick(x: f64, y: f64) -> SurfaceEvent {
        SurfaceEvent::Move {
            control: "left_stick".to_string(),
            sample: PointerSample::new(x, y, 100.0),
        }
    }

    /// Publish offsets from `t0`, in milliseconds.
    fn offsets(sim: &SimTransport, t0: Instant) -> Vec<u128> {
        sim.publishes().iter().map(|(at, _)| (*at - t0).as_millis()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn held_button_resends_until_release() {
        let sim = Arc::new(SimTransport::default());
        let t0 = Instant::now();
        let handle = mount(SurfaceKind::Drone, &sim);

        handle.send(press("forward")).unwrap();
        sleep(ms(350)).await;
        handle.send(release("forward")).unwrap();
        let report = handle.unmount().await.unwrap().unwrap();

        assert_eq!(offsets(&sim, t0), vec![0, 100, 200, 300, 350]);
        let publishes = sim.publishes();
        assert_eq!(publishes[0].1["linear"]["x"], 0.25);
        assert_eq!(publishes[3].1["linear"]["x"], 0.25);
        assert_eq!(publishes[4].1["linear"]["x"], 0.0);
        // Already stopped: teardown does not flush again.
        assert!(!report.flushed);
    }

    #[tokio::test(start_paused = true)]
    async fn stick_held_still_keeps_resending() {
        let sim = Arc::new(SimTransport::default());
        let t0 = Instant::now();
        let handle = mount(SurfaceKind::DualJoystick, &sim);

        handle.send(stick(0.0, -100.0)).unwrap();
        sleep(ms(450)).await;
        assert_eq!(handle.snapshot().held, vec!["left_stick".to_string()]);
        handle.send(release("left_stick")).unwrap();
        sleep(ms(200)).await;

        assert_eq!(offsets(&sim, t0), vec![0, 100, 200, 300, 400, 450]);
        let publishes = sim.publishes();
        assert_eq!(publishes[4].1["linear"]["x"], 0.25);
        assert_eq!(publishes[5].1["linear"]["x"], 0.0);
        handle.unmount().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_rate_limited_and_trailing_carries_last_value() {
        let sim = Arc::new(SimTransport::default());
        let t0 = Instant::now();
        let handle = mount(SurfaceKind::DualJoystick, &sim);

        for i in 1..=10 {
            handle.send(stick(0.0, -10.0 * f64::from(i))).unwrap();
            sleep(ms(5)).await;
        }
        // Past the window, short of the next hold resend.
        sleep(ms(60)).await;

        assert_eq!(offsets(&sim, t0), vec![0, 100]);
        let publishes = sim.publishes();
        // Full deflection up, normal speed: 0.5 · 0.5 m/s.
        assert_eq!(publishes[1].1["linear"]["x"], 0.25);
        handle.unmount().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn release_cancels_pending_trailing_publish() {
        let sim = Arc::new(SimTransport::default());
        let t0 = Instant::now();
        let handle = mount(SurfaceKind::DualJoystick, &sim);

        handle.send(stick(0.0, -100.0)).unwrap();
        sleep(ms(10)).await;
        handle.send(stick(0.0, -50.0)).unwrap();
        sleep(ms(10)).await;
        handle.send(release("left_stick")).unwrap();
        sleep(ms(300)).await;

        assert_eq!(offsets(&sim, t0), vec![0, 20]);
        assert_eq!(sim.publishes()[1].1["linear"]["x"], 0.0);
        handle.unmount().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_while_moving_flushes_once_before_unadvertise() {
        let sim = Arc::new(SimTransport::default());
        let handle = mount(SurfaceKind::Drone, &sim);

        handle.send(press("forward")).unwrap();
        sleep(ms(150)).await;
        let report = handle.unmount().await.unwrap().unwrap();
        assert!(report.flushed);
        assert!(report.unadvertised);

        let frames = sim.frames();
        let n = frames.len();
        assert!(matches!(frames[0].frame, SimFrame::Advertise { .. }));
        assert!(matches!(frames[n - 1].frame, SimFrame::Unadvertise { .. }));
        let SimFrame::Publish { message, .. } = &frames[n - 2].frame else {
            panic!("expected the stop publish before unadvertise");
        };
        assert_eq!(message["linear"]["x"], 0.0);
        // press + one hold resend + the stop.
        assert_eq!(sim.publishes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_release_sends_one_stop() {
        let sim = Arc::new(SimTransport::default());
        let handle = mount(SurfaceKind::Drone, &sim);

        handle.send(press("left")).unwrap();
        handle.send(release("left")).unwrap();
        handle.send(release("left")).unwrap();
        handle.send(SurfaceEvent::Leave { control: "left".to_string() }).unwrap();
        sleep(ms(500)).await;
        handle.unmount().await.unwrap();

        assert_eq!(sim.publishes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_tears_down_and_closes_the_handle() {
        let sim = Arc::new(SimTransport::default());
        let handle = mount(SurfaceKind::Drone, &sim);
        let mut snapshots = handle.subscribe();
        snapshots.wait_for(|s| s.phase == LifecyclePhase::Active).await.unwrap();

        handle.send(press("forward")).unwrap();
        sleep(ms(50)).await;
        sim.set_connected(false);
        snapshots
            .wait_for(|s| s.phase == LifecyclePhase::TornDown)
            .await
            .unwrap();

        assert!(matches!(handle.send(press("forward")), Err(TeleopError::Channel(_))));
        let report = handle.unmount().await.unwrap().unwrap();
        assert_eq!(report.reason, TeardownReason::Disconnected);
        // The link is down, so the stop could not go out.
        assert!(!report.flushed);
    }

    #[tokio::test(start_paused = true)]
    async fn advertises_once_transport_connects() {
        let sim = Arc::new(SimTransport::new(false));
        let handle = mount(SurfaceKind::ButtonGrid, &sim);
        let mut snapshots = handle.subscribe();

        handle.send(press("button1")).unwrap();
        sleep(ms(10)).await;
        assert_eq!(handle.snapshot().phase, LifecyclePhase::Uninitialized);
        assert!(sim.frames().is_empty());

        sim.set_connected(true);
        snapshots.wait_for(|s| s.phase == LifecyclePhase::Active).await.unwrap();
        assert!(matches!(sim.frames()[0].frame, SimFrame::Advertise { .. }));

        handle.send(press("button1")).unwrap();
        sleep(ms(10)).await;
        let publishes = sim.publishes();
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].1["buttons"][1], 1);
        handle.unmount().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn parameter_changes_only_affect_next_contribution() {
        let sim = Arc::new(SimTransport::default());
        let handle = mount(SurfaceKind::ArmJog, &sim);

        handle.send(SurfaceEvent::SetSpeedMode(SpeedMode::Fast)).unwrap();
        handle.send(SurfaceEvent::SetReferenceFrame(ReferenceFrame::Tool)).unwrap();
        sleep(ms(10)).await;
        assert!(sim.publishes().is_empty());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.speed_mode, SpeedMode::Fast);
        assert_eq!(snapshot.frame, ReferenceFrame::Tool);

        handle.send(press("x+")).unwrap();
        sleep(ms(10)).await;
        assert_eq!(handle.snapshot().state.get(CommandChannel::LINEAR_Z), Some(0.5));
        assert_eq!(handle.snapshot().held, vec!["x+".to_string()]);
        handle.unmount().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn voice_latch_keeps_resending_until_stop() {
        let sim = Arc::new(SimTransport::default());
        let t0 = Instant::now();
        let handle = mount(SurfaceKind::Voice, &sim);

        handle.send(SurfaceEvent::Phrase("go forward".to_string())).unwrap();
        sleep(ms(250)).await;
        handle.send(SurfaceEvent::Phrase("stop".to_string())).unwrap();
        sleep(ms(250)).await;
        handle.unmount().await.unwrap();

        assert_eq!(offsets(&sim, t0), vec![0, 100, 200, 250]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_unmounts() {
        let sim = Arc::new(SimTransport::default());
        let handle = mount(SurfaceKind::Drone, &sim);
        handle.send(press("back")).unwrap();
        sleep(ms(10)).await;
        drop(handle);
        sleep(ms(10)).await;

        let frames = sim.frames();
        assert!(matches!(frames.last().unwrap().frame, SimFrame::Unadvertise { .. }));
        assert_eq!(sim.publishes().last().unwrap().1["linear"]["x"], 0.0);
    }
}
