//! `teleop-runtime` – Surfaces & Orchestration
//!
//! Turns operator input into rate-limited robot commands.  One
//! [`SurfaceHandle`] per mounted control surface; everything behind it runs on
//! that surface's actor task.
//!
//! # Modules
//!
//! - [`mapper`] – pure input → [`PartialCommand`][teleop_types::PartialCommand]
//!   mapping: normalisation, rescaling deadzone, speed-mode scaling, explicit
//!   axis/button routes.
//! - [`surfaces`] – [`SurfaceSettings`] and the five presets (dual joystick,
//!   drone, arm jog, button grid, voice).
//! - [`pipeline`] – [`CommandPipeline`]: command state, throttle, hold driver
//!   and publisher for one surface; implements the kernel's
//!   [`GuardedPipeline`][teleop_kernel::GuardedPipeline].
//! - [`surface`] – the actor task and its [`SurfaceHandle`].
//! - [`telemetry`] – `tracing` subscriber setup with optional OTLP export.

pub mod mapper;
pub mod pipeline;
pub mod surface;
pub mod surfaces;
pub mod telemetry;

pub use mapper::{AxisRoute, ButtonRoute, MapperPolicy, SpeedScales, StickRoutes};
pub use pipeline::CommandPipeline;
pub use surface::{SurfaceEvent, SurfaceHandle, SurfaceSnapshot};
pub use surfaces::{ControlBinding, SurfaceDefinition, SurfaceKind, SurfaceSettings};
