//! `teleop-types` – shared vocabulary of the teleop command pipeline.
//!
//! Everything that crosses a crate boundary lives here: command channels and
//! the composite [`CommandState`], input samples, surface parameters
//! ([`SpeedMode`], [`ReferenceFrame`]) and the global [`TeleopError`].

pub mod command;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::{Axis3, CommandChannel, CommandState, PartialCommand};

/// Operator-selectable velocity scale applied by the output mapper.
///
/// Changing the mode never publishes by itself; it only affects the next
/// contribution an input source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMode {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl SpeedMode {
    /// Cycle to the next mode (`slow → normal → fast → slow`), as a toggle
    /// button in the UI would.
    pub fn next(self) -> Self {
        match self {
            SpeedMode::Slow => SpeedMode::Normal,
            SpeedMode::Normal => SpeedMode::Fast,
            SpeedMode::Fast => SpeedMode::Slow,
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedMode::Slow => write!(f, "slow"),
            SpeedMode::Normal => write!(f, "normal"),
            SpeedMode::Fast => write!(f, "fast"),
        }
    }
}

impl FromStr for SpeedMode {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(SpeedMode::Slow),
            "normal" => Ok(SpeedMode::Normal),
            "fast" => Ok(SpeedMode::Fast),
            other => Err(TeleopError::Config(format!("unknown speed mode '{other}'"))),
        }
    }
}

/// Frame in which jog commands are expressed.
///
/// Only surfaces whose bindings carry a tool-frame route react to it; for the
/// others it is display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceFrame {
    #[default]
    World,
    Tool,
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceFrame::World => write!(f, "world"),
            ReferenceFrame::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for ReferenceFrame {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "world" | "base" => Ok(ReferenceFrame::World),
            "tool" => Ok(ReferenceFrame::Tool),
            other => Err(TeleopError::Config(format!("unknown reference frame '{other}'"))),
        }
    }
}

/// A raw pointer sample as reported by a joystick widget.
///
/// `x`/`y` are offsets from the widget centre in widget units and `size` is
/// the full-scale radius used to normalise them.  Fields are optional because
/// a misbehaving widget can report a missing axis; such samples are rejected
/// by the mapper instead of being read as "centred".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub size: Option<f64>,
}

impl PointerSample {
    /// A complete sample.
    pub fn new(x: f64, y: f64, size: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            size: Some(size),
        }
    }

    /// A sample already normalised to `[-1, 1]` (full scale of 1).
    pub fn normalized(x: f64, y: f64) -> Self {
        Self::new(x, y, 1.0)
    }
}

/// Global error type of the teleop pipeline.
///
/// None of these are fatal to the host: the surface actor logs them and keeps
/// running (or tears down safely).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Transport not ready: {0}")]
    TransportNotReady(String),

    #[error("Invalid input sample: {0}")]
    InvalidSample(String),

    #[error("Unknown control '{0}'")]
    UnknownControl(String),

    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_mode_cycles() {
        assert_eq!(SpeedMode::Slow.next(), SpeedMode::Normal);
        assert_eq!(SpeedMode::Normal.next(), SpeedMode::Fast);
        assert_eq!(SpeedMode::Fast.next(), SpeedMode::Slow);
    }

    #[test]
    fn speed_mode_parses_case_insensitively() {
        assert_eq!("FAST".parse::<SpeedMode>().unwrap(), SpeedMode::Fast);
        assert_eq!(" slow ".parse::<SpeedMode>().unwrap(), SpeedMode::Slow);
        assert!("warp".parse::<SpeedMode>().is_err());
    }

    #[test]
    fn reference_frame_accepts_base_alias() {
        assert_eq!("base".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::World);
        assert_eq!("tool".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::Tool);
    }

    #[test]
    fn speed_mode_serializes_lowercase() {
        let json = serde_json::to_string(&SpeedMode::Fast).unwrap();
        assert_eq!(json, "\"fast\"");
    }

    #[test]
    fn teleop_error_display() {
        let err = TeleopError::TransportNotReady("/cmd_vel".to_string());
        assert!(err.to_string().contains("Transport not ready"));
        assert!(err.to_string().contains("/cmd_vel"));
    }

    #[test]
    fn normalized_sample_has_unit_size() {
        let s = PointerSample::normalized(0.5, -0.5);
        assert_eq!(s.size, Some(1.0));
        assert_eq!(s.x, Some(0.5));
    }
}
