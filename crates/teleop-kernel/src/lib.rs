//! `teleop-kernel` – Timing & Safety
//!
//! The part of the pipeline that decides *when* a command leaves and makes
//! sure the last one to leave is a stop.  Nothing here owns a task or a
//! timer: every type is a plain state machine that takes the current
//! [`Instant`][tokio::time::Instant] and reports its next deadline, so the
//! owning event loop stays the single place where time passes.
//!
//! # Modules
//!
//! - [`throttle`] – [`Throttle`][throttle::Throttle]: leading + trailing edge
//!   rate limiter with a single overwrite-only pending slot.
//! - [`hold`] – [`HoldDriver`][hold::HoldDriver]: one repeating deadline per
//!   held control; missed ticks collapse into one resend.
//! - [`lifecycle`] – [`LifecycleGuard`][lifecycle::LifecycleGuard]:
//!   `Uninitialized → Active → TornDown` with a guaranteed neutral flush
//!   before the topic is withdrawn, driven through the
//!   [`GuardedPipeline`][lifecycle::GuardedPipeline] seam.

pub mod hold;
pub mod lifecycle;
pub mod throttle;

pub use hold::HoldDriver;
pub use lifecycle::{GuardedPipeline, LifecycleGuard, LifecyclePhase, TeardownReason, TeardownReport};
pub use throttle::Throttle;
