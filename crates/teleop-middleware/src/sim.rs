//! In-memory transport.
//!
//! [`SimTransport`] accepts the same operations as a real transport but only
//! records them, stamped with [`tokio::time::Instant`] so paused-clock tests
//! can assert on publish timing.  Every recorded frame is also fanned out on a
//! broadcast channel so a dry-run host can print traffic as it happens.

use std::sync::Mutex;

use serde_json::Value;
use teleop_types::TeleopError;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::transport::Transport;

const FRAME_CAPACITY: usize = 256;

/// One operation accepted by the simulated transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SimFrame {
    Advertise { topic: String, message_type: String },
    Unadvertise { topic: String },
    Publish { topic: String, message: Value },
}

/// A [`SimFrame`] plus the instant it was accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub at: Instant,
    pub frame: SimFrame,
}

/// Recording transport for tests and dry runs.
pub struct SimTransport {
    frames: Mutex<Vec<SentFrame>>,
    connected: watch::Sender<bool>,
    fanout: broadcast::Sender<SentFrame>,
}

impl SimTransport {
    /// Create a transport that starts in the given connection state.
    pub fn new(connected: bool) -> Self {
        let (fanout, _) = broadcast::channel(FRAME_CAPACITY);
        Self {
            frames: Mutex::new(Vec::new()),
            connected: watch::Sender::new(connected),
            fanout,
        }
    }

    /// Flip the connection state, notifying every [`Transport::connection`]
    /// subscriber.
    pub fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
    }

    /// Subscribe to frames as they are accepted.
    pub fn subscribe(&self) -> broadcast::Receiver<SentFrame> {
        self.fanout.subscribe()
    }

    /// Snapshot of every frame accepted so far.
    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Only the published message bodies, with their timestamps.
    pub fn publishes(&self) -> Vec<(Instant, Value)> {
        self.frames()
            .into_iter()
            .filter_map(|sent| match sent.frame {
                SimFrame::Publish { message, .. } => Some((sent.at, message)),
                _ => None,
            })
            .collect()
    }

    /// Forget every recorded frame.
    pub fn clear(&self) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
    }

    fn record(&self, frame: SimFrame) -> Result<(), TeleopError> {
        if !*self.connected.borrow() {
            return Err(TeleopError::TransportNotReady("sim transport disconnected".to_string()));
        }
        debug!(?frame, "sim frame");
        let sent = SentFrame {
            at: Instant::now(),
            frame,
        };
        self.frames
            .lock()
            .map_err(|e| TeleopError::Channel(format!("sim frame log poisoned: {e}")))?
            .push(sent.clone());
        // No subscribers is fine.
        let _ = self.fanout.send(sent);
        Ok(())
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Transport for SimTransport {
    fn advertise(&self, topic: &str, message_type: &str) -> Result<(), TeleopError> {
        self.record(SimFrame::Advertise {
            topic: topic.to_string(),
            message_type: message_type.to_string(),
        })
    }

    fn unadvertise(&self, topic: &str) -> Result<(), TeleopError> {
        self.record(SimFrame::Unadvertise {
            topic: topic.to_string(),
        })
    }

    fn publish(&self, topic: &str, message: &Value) -> Result<(), TeleopError> {
        self.record(SimFrame::Publish {
            topic: topic.to_string(),
            message: message.clone(),
        })
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
