//! Control-surface presets.
//!
//! Every surface is the same pipeline with different data: a set of named
//! control bindings, a message layout and a topic.  [`SurfaceSettings`] is the
//! serde-friendly configuration; [`SurfaceSettings::build`] turns it into a
//! [`SurfaceDefinition`] for one of the five [`SurfaceKind`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use teleop_middleware::MessageLayout;
use teleop_types::{CommandChannel, ReferenceFrame, SpeedMode, TeleopError};

use crate::mapper::{AxisRoute, ButtonRoute, MapperPolicy, SpeedScales, StickRoutes};

// ────────────────────────────────────────────────────────────────────────────
// SurfaceKind
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    #[default]
    DualJoystick,
    Drone,
    ArmJog,
    ButtonGrid,
    Voice,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 5] = [
        SurfaceKind::DualJoystick,
        SurfaceKind::Drone,
        SurfaceKind::ArmJog,
        SurfaceKind::ButtonGrid,
        SurfaceKind::Voice,
    ];

    fn default_topic(self) -> &'static str {
        match self {
            SurfaceKind::DualJoystick | SurfaceKind::Drone | SurfaceKind::Voice => "/cmd_vel",
            SurfaceKind::ArmJog => "/arm/jog_cmd",
            SurfaceKind::ButtonGrid => "/joy",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceKind::DualJoystick => "dual_joystick",
            SurfaceKind::Drone => "drone",
            SurfaceKind::ArmJog => "arm_jog",
            SurfaceKind::ButtonGrid => "button_grid",
            SurfaceKind::Voice => "voice",
        };
        f.write_str(name)
    }
}

impl FromStr for SurfaceKind {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dual_joystick" | "joystick" | "joy" => Ok(SurfaceKind::DualJoystick),
            "drone" => Ok(SurfaceKind::Drone),
            "arm_jog" | "arm" => Ok(SurfaceKind::ArmJog),
            "button_grid" | "grid" | "buttons" => Ok(SurfaceKind::ButtonGrid),
            "voice" => Ok(SurfaceKind::Voice),
            other => Err(TeleopError::Config(format!("unknown surface '{other}'"))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bindings
// ────────────────────────────────────────────────────────────────────────────

/// What a named control on the surface does.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlBinding {
    Stick(StickRoutes),
    Button(ButtonRoute),
}

impl ControlBinding {
    /// Every channel the control may write, across both frames.
    pub fn channels(&self) -> Vec<CommandChannel> {
        match self {
            ControlBinding::Stick(routes) => routes.channels(),
            ControlBinding::Button(route) => {
                let mut channels = vec![route.world.channel];
                if let Some(tool) = route.tool {
                    channels.push(tool.channel);
                }
                channels
            }
        }
    }
}

/// A fully resolved surface, ready to be mounted.
#[derive(Debug, Clone)]
pub struct SurfaceDefinition {
    pub kind: SurfaceKind,
    pub topic: String,
    pub layout: MessageLayout,
    pub bindings: BTreeMap<String, ControlBinding>,
    /// Spoken phrase → control it latches.  Empty for non-voice surfaces.
    pub phrases: BTreeMap<String, String>,
}

impl SurfaceDefinition {
    pub fn binding(&self, control: &str) -> Result<&ControlBinding, TeleopError> {
        self.bindings
            .get(control)
            .ok_or_else(|| TeleopError::UnknownControl(control.to_string()))
    }

    /// Control latched by `phrase`, if any.  Matching ignores case and
    /// surrounding whitespace.
    pub fn phrase_control(&self, phrase: &str) -> Option<&str> {
        self.phrases
            .get(phrase.trim().to_ascii_lowercase().as_str())
            .map(String::as_str)
    }
}

/// Phrases that release every latched control.
pub const STOP_PHRASES: [&str; 3] = ["stop", "halt", "freeze"];

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

fn default_throttle_ms() -> u64 {
    100
}

fn default_deadzone() -> f64 {
    0.05
}

fn default_max_linear() -> f64 {
    0.5
}

fn default_max_angular() -> f64 {
    1.0
}

fn default_grid_size() -> u8 {
    8
}

/// Upper bound for `throttle_ms` and `hold_interval_ms`.
pub const MAX_PERIOD_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSettings {
    #[serde(default)]
    pub kind: SurfaceKind,
    /// Overrides the preset topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Minimum interval between throttled publishes.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Resend interval of held controls; the throttle window when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_interval_ms: Option<u64>,
    #[serde(default = "default_deadzone")]
    pub deadzone: f64,
    /// Full-scale linear speed in m/s.
    #[serde(default = "default_max_linear")]
    pub max_linear: f64,
    /// Full-scale angular speed in rad/s.
    #[serde(default = "default_max_angular")]
    pub max_angular: f64,
    #[serde(default)]
    pub speed_scales: SpeedScales,
    /// Number of buttons on the button grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: u8,
    #[serde(default)]
    pub speed_mode: SpeedMode,
    #[serde(default)]
    pub frame: ReferenceFrame,
    /// Overrides the preset message layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<MessageLayout>,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self::new(SurfaceKind::default())
    }
}

impl SurfaceSettings {
    pub fn new(kind: SurfaceKind) -> Self {
        Self {
            kind,
            topic: None,
            throttle_ms: default_throttle_ms(),
            hold_interval_ms: None,
            deadzone: default_deadzone(),
            max_linear: default_max_linear(),
            max_angular: default_max_angular(),
            speed_scales: SpeedScales::default(),
            grid_size: default_grid_size(),
            speed_mode: SpeedMode::default(),
            frame: ReferenceFrame::default(),
            layout: None,
        }
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn hold_interval(&self) -> Duration {
        Duration::from_millis(self.hold_interval_ms.unwrap_or(self.throttle_ms))
    }

    pub fn policy(&self) -> MapperPolicy {
        MapperPolicy {
            deadzone: self.deadzone,
            scales: self.speed_scales,
            speed_mode: self.speed_mode,
            frame: self.frame,
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), TeleopError> {
        for (name, value) in [("throttle_ms", Some(self.throttle_ms)), ("hold_interval_ms", self.hold_interval_ms)] {
            match value {
                Some(0) => return Err(TeleopError::Config(format!("{name} must be positive"))),
                Some(ms) if ms > MAX_PERIOD_MS => {
                    return Err(TeleopError::Config(format!(
                        "{name} must be at most {MAX_PERIOD_MS}, got {ms}"
                    )));
                }
                _ => {}
            }
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(TeleopError::Config(format!(
                "deadzone must be in [0, 1), got {}",
                self.deadzone
            )));
        }
        for (name, value) in [("max_linear", self.max_linear), ("max_angular", self.max_angular)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TeleopError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.kind == SurfaceKind::ButtonGrid && self.grid_size == 0 {
            return Err(TeleopError::Config("grid_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolve the preset for [`kind`][Self::kind].
    pub fn build(&self) -> Result<SurfaceDefinition, TeleopError> {
        self.validate()?;
        let (preset_layout, bindings, phrases) = match self.kind {
            SurfaceKind::DualJoystick => (MessageLayout::twist(), self.dual_joystick(), BTreeMap::new()),
            SurfaceKind::Drone => (MessageLayout::twist(), self.drone(), BTreeMap::new()),
            SurfaceKind::ArmJog => (MessageLayout::twist(), self.arm_jog(), BTreeMap::new()),
            SurfaceKind::ButtonGrid => (MessageLayout::joy(0, self.grid_size), self.button_grid(), BTreeMap::new()),
            SurfaceKind::Voice => (MessageLayout::twist(), self.voice(), voice_phrases()),
        };
        Ok(SurfaceDefinition {
            kind: self.kind,
            topic: self
                .topic
                .clone()
                .unwrap_or_else(|| self.kind.default_topic().to_string()),
            layout: self.layout.clone().unwrap_or(preset_layout),
            bindings,
            phrases,
        })
    }

    fn dual_joystick(&self) -> BTreeMap<String, ControlBinding> {
        let left = StickRoutes {
            x: Some(AxisRoute::new(CommandChannel::LINEAR_Y, self.max_linear).inverted()),
            y: Some(AxisRoute::new(CommandChannel::LINEAR_X, self.max_linear).inverted()),
        };
        let right = StickRoutes {
            x: Some(AxisRoute::new(CommandChannel::ANGULAR_Z, self.max_angular).inverted()),
            y: None,
        };
        BTreeMap::from([
            ("left_stick".to_string(), ControlBinding::Stick(left)),
            ("right_stick".to_string(), ControlBinding::Stick(right)),
        ])
    }

    fn drone(&self) -> BTreeMap<String, ControlBinding> {
        let stick = StickRoutes {
            x: Some(AxisRoute::new(CommandChannel::ANGULAR_Z, self.max_angular).inverted()),
            y: Some(AxisRoute::new(CommandChannel::LINEAR_Z, self.max_linear).inverted()),
        };
        let v = self.max_linear;
        BTreeMap::from([
            ("stick".to_string(), ControlBinding::Stick(stick)),
            button("forward", ButtonRoute::new(CommandChannel::LINEAR_X, v)),
            button("back", ButtonRoute::new(CommandChannel::LINEAR_X, -v)),
            button("left", ButtonRoute::new(CommandChannel::LINEAR_Y, v)),
            button("right", ButtonRoute::new(CommandChannel::LINEAR_Y, -v)),
        ])
    }

    /// Tool frame: the approach axis (tool z) points along world x.
    ///
    /// | button | world        | tool          |
    /// |--------|--------------|---------------|
    /// | x±     | ±linear.x    | ±linear.z     |
    /// | y±     | ±linear.y    | ±linear.y     |
    /// | z±     | ±linear.z    | ∓linear.x     |
    /// | roll±  | ±angular.x   | ±angular.z    |
    /// | pitch± | ±angular.y   | ±angular.y    |
    /// | yaw±   | ±angular.z   | ∓angular.x    |
    fn arm_jog(&self) -> BTreeMap<String, ControlBinding> {
        use CommandChannel as C;
        let (l, a) = (self.max_linear, self.max_angular);
        let axes = [
            ("x", C::LINEAR_X, (C::LINEAR_Z, 1.0), l),
            ("y", C::LINEAR_Y, (C::LINEAR_Y, 1.0), l),
            ("z", C::LINEAR_Z, (C::LINEAR_X, -1.0), l),
            ("roll", C::ANGULAR_X, (C::ANGULAR_Z, 1.0), a),
            ("pitch", C::ANGULAR_Y, (C::ANGULAR_Y, 1.0), a),
            ("yaw", C::ANGULAR_Z, (C::ANGULAR_X, -1.0), a),
        ];
        let mut bindings = BTreeMap::new();
        for (name, world, (tool, tool_sign), max) in axes {
            for (suffix, sign) in [("+", 1.0), ("-", -1.0)] {
                let route = ButtonRoute::new(world, sign * max).with_tool(tool, sign * tool_sign * max);
                bindings.insert(format!("{name}{suffix}"), ControlBinding::Button(route));
            }
        }
        bindings
    }

    fn button_grid(&self) -> BTreeMap<String, ControlBinding> {
        (0..self.grid_size)
            .map(|i| button(&format!("button{i}"), ButtonRoute::new(CommandChannel::Button(i), 1.0).unscaled()))
            .collect()
    }

    fn voice(&self) -> BTreeMap<String, ControlBinding> {
        let (l, a) = (self.max_linear, self.max_angular);
        BTreeMap::from([
            button("forward", ButtonRoute::new(CommandChannel::LINEAR_X, l)),
            button("back", ButtonRoute::new(CommandChannel::LINEAR_X, -l)),
            button("left", ButtonRoute::new(CommandChannel::ANGULAR_Z, a)),
            button("right", ButtonRoute::new(CommandChannel::ANGULAR_Z, -a)),
        ])
    }
}

fn button(name: &str, route: ButtonRoute) -> (String, ControlBinding) {
    (name.to_string(), ControlBinding::Button(route))
}

fn voice_phrases() -> BTreeMap<String, String> {
    [
        ("forward", "forward"),
        ("go forward", "forward"),
        ("ahead", "forward"),
        ("back", "back"),
        ("backward", "back"),
        ("reverse", "back"),
        ("left", "left"),
        ("turn left", "left"),
        ("right", "right"),
        ("turn right", "right"),
    ]
    .into_iter()
    .map(|(phrase, control)| (phrase.to_string(), control.to_string()))
    .collect()
}
