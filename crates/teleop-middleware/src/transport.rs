//! The transport seam.
//!
//! The pipeline never speaks a wire protocol directly.  It holds an
//! `Arc<dyn Transport>` and calls these four operations; adapters translate
//! them into the protocol of the outside world.
//!
//! # Overview
//!
//! - [`RosbridgeTransport`][crate::rosbridge::RosbridgeTransport] – rosbridge
//!   v2 JSON over a WebSocket.
//! - [`SimTransport`][crate::sim::SimTransport] – in-memory recorder.

use serde_json::Value;
use teleop_types::TeleopError;
use tokio::sync::watch;

/// Every outbound transport must implement this trait.
///
/// # Contract
///
/// * All operations are fire-and-forget and must not block the caller.
/// * While disconnected, `advertise`, `unadvertise` and `publish` return
///   [`TeleopError::TransportNotReady`]; nothing is queued for later.
/// * [`connection`][Transport::connection] yields the live connection state so
///   a control surface can tear down when the link drops and re-advertise when
///   it comes back.
pub trait Transport: Send + Sync {
    /// Announce that this client will publish `message_type` on `topic`.
    fn advertise(&self, topic: &str, message_type: &str) -> Result<(), TeleopError>;

    /// Withdraw a previous advertisement of `topic`.
    fn unadvertise(&self, topic: &str) -> Result<(), TeleopError>;

    /// Publish one already-encoded message body on `topic`.
    fn publish(&self, topic: &str, message: &Value) -> Result<(), TeleopError>;

    /// Current connection state.
    fn is_connected(&self) -> bool;

    /// Subscribe to connection-state changes.
    fn connection(&self) -> watch::Receiver<bool>;
}
