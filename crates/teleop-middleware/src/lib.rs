//! `teleop-middleware` – the outbound half of the pipeline.
//!
//! Moves composed commands to the robot without caring what they mean.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] trait: the opaque publish/subscribe
//!   handle the pipeline consumes (`advertise`, `unadvertise`, `publish`,
//!   connection state).
//! - [`layout`] – [`MessageLayout`]: configurable channel → message-field
//!   mapping with `geometry_msgs/Twist` and `sensor_msgs/Joy` presets.
//! - [`publisher`] – [`Publisher`]: owns the single outbound topic of a
//!   control surface and remembers the last state it sent.
//! - [`rosbridge`] – [`RosbridgeTransport`]: rosbridge v2 JSON over a
//!   WebSocket client connection.
//! - [`sim`] – [`SimTransport`]: in-memory transport that records every
//!   frame, for tests and dry runs.

pub mod layout;
pub mod publisher;
pub mod rosbridge;
pub mod sim;
pub mod transport;

pub use layout::MessageLayout;
pub use publisher::Publisher;
pub use rosbridge::RosbridgeTransport;
pub use sim::{SentFrame, SimFrame, SimTransport};
pub use transport::Transport;
