//! Output mapper – raw input to a [`PartialCommand`].
//!
//! Pure functions only.  A pointer sample is normalised by the widget's full
//! scale, clamped to `[-1, 1]`, optionally inverted, passed through a
//! rescaling deadzone and multiplied by the speed-mode multiplier times the
//! route's full-scale output:
//!
//! ```text
//! |x| < ε   →  0
//! otherwise →  sign(x) · (|x| − ε) / (1 − ε) · multiplier · max
//! ```
//!
//! Routing is always explicit ([`AxisRoute`], [`ButtonRoute`]); the mapper
//! never guesses which channel an axis drives.

use serde::{Deserialize, Serialize};
use teleop_types::{CommandChannel, PartialCommand, PointerSample, ReferenceFrame, SpeedMode, TeleopError};

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// Multiplier applied per [`SpeedMode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedScales {
    pub slow: f64,
    pub normal: f64,
    pub fast: f64,
}

impl Default for SpeedScales {
    fn default() -> Self {
        Self {
            slow: 0.25,
            normal: 0.5,
            fast: 1.0,
        }
    }
}

impl SpeedScales {
    pub fn for_mode(&self, mode: SpeedMode) -> f64 {
        match mode {
            SpeedMode::Slow => self.slow,
            SpeedMode::Normal => self.normal,
            SpeedMode::Fast => self.fast,
        }
    }
}

/// Everything the mapper needs besides the sample and its route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperPolicy {
    /// Deadzone radius `ε` in normalised units, `0 <= ε < 1`.
    pub deadzone: f64,
    pub scales: SpeedScales,
    pub speed_mode: SpeedMode,
    pub frame: ReferenceFrame,
}

impl Default for MapperPolicy {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            scales: SpeedScales::default(),
            speed_mode: SpeedMode::default(),
            frame: ReferenceFrame::default(),
        }
    }
}

impl MapperPolicy {
    /// Multiplier selected by the current speed mode.
    pub fn multiplier(&self) -> f64 {
        self.scales.for_mode(self.speed_mode)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Routes
// ────────────────────────────────────────────────────────────────────────────

/// One stick axis → one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRoute {
    pub channel: CommandChannel,
    /// Flip the sign before the deadzone (screen y grows downwards).
    #[serde(default)]
    pub invert: bool,
    /// Full-scale output, e.g. max linear speed in m/s.
    pub max: f64,
}

impl AxisRoute {
    pub fn new(channel: CommandChannel, max: f64) -> Self {
        Self {
            channel,
            invert: false,
            max,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

/// Both axes of a two-axis stick.  An absent axis is not driven.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StickRoutes {
    #[serde(default)]
    pub x: Option<AxisRoute>,
    #[serde(default)]
    pub y: Option<AxisRoute>,
}

impl StickRoutes {
    /// Channels this stick owns.
    pub fn channels(&self) -> Vec<CommandChannel> {
        [self.x, self.y].iter().flatten().map(|r| r.channel).collect()
    }
}

/// Channel and signed full-scale value a button drives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonTarget {
    pub channel: CommandChannel,
    pub value: f64,
}

impl ButtonTarget {
    pub fn new(channel: CommandChannel, value: f64) -> Self {
        Self { channel, value }
    }
}

fn default_scaled() -> bool {
    true
}

/// A momentary button.
///
/// `tool` re-targets the button while the policy's frame is
/// [`ReferenceFrame::Tool`]; without it the button ignores the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonRoute {
    pub world: ButtonTarget,
    #[serde(default)]
    pub tool: Option<ButtonTarget>,
    /// Apply the speed-mode multiplier.  Off for on/off buttons.
    #[serde(default = "default_scaled")]
    pub scaled: bool,
}

impl ButtonRoute {
    pub fn new(channel: CommandChannel, value: f64) -> Self {
        Self {
            world: ButtonTarget::new(channel, value),
            tool: None,
            scaled: true,
        }
    }

    pub fn with_tool(mut self, channel: CommandChannel, value: f64) -> Self {
        self.tool = Some(ButtonTarget::new(channel, value));
        self
    }

    pub fn unscaled(mut self) -> Self {
        self.scaled = false;
        self
    }

    pub fn target(&self, frame: ReferenceFrame) -> ButtonTarget {
        match (frame, self.tool) {
            (ReferenceFrame::Tool, Some(tool)) => tool,
            _ => self.world,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mapping
// ────────────────────────────────────────────────────────────────────────────

/// Divide by the full-scale `size` and clamp to `[-1, 1]`.
///
/// # Errors
///
/// [`TeleopError::InvalidSample`] for a missing or non-finite value or a
/// size that is not a positive finite number.
pub fn normalize(value: Option<f64>, size: Option<f64>) -> Result<f64, TeleopError> {
    let size = match size {
        Some(s) if s.is_finite() && s > 0.0 => s,
        other => {
            return Err(TeleopError::InvalidSample(format!("bad full-scale size {other:?}")));
        }
    };
    match value {
        Some(v) if v.is_finite() => Ok((v / size).clamp(-1.0, 1.0)),
        other => Err(TeleopError::InvalidSample(format!("bad axis value {other:?}"))),
    }
}

/// Rescaling deadzone: exactly `0` inside `ε`, then linear from `0` at `ε`
/// to `±scale` at `±1`.
pub fn apply_deadzone(x: f64, deadzone: f64, scale: f64) -> f64 {
    let magnitude = x.abs();
    if magnitude < deadzone || deadzone >= 1.0 {
        return 0.0;
    }
    x.signum() * (magnitude - deadzone) / (1.0 - deadzone) * scale
}

fn map_axis(normalized: f64, route: &AxisRoute, policy: &MapperPolicy) -> f64 {
    let signed = if route.invert { -normalized } else { normalized };
    apply_deadzone(signed, policy.deadzone, policy.multiplier() * route.max)
}

/// Map one stick sample.  Both axes are validated before anything is
/// produced, so a bad sample never yields a half update.
pub fn map_stick(
    sample: &PointerSample,
    routes: &StickRoutes,
    policy: &MapperPolicy,
) -> Result<PartialCommand, TeleopError> {
    let x = normalize(sample.x, sample.size)?;
    let y = normalize(sample.y, sample.size)?;

    let mut partial = PartialCommand::new();
    if let Some(route) = &routes.x {
        partial.set(route.channel, map_axis(x, route, policy));
    }
    if let Some(route) = &routes.y {
        partial.set(route.channel, map_axis(y, route, policy));
    }
    Ok(partial)
}

/// Contribution of a pressed button under the current frame and speed mode.
pub fn map_button(route: &ButtonRoute, policy: &MapperPolicy) -> PartialCommand {
    let target = route.target(policy.frame);
    let value = if route.scaled {
        target.value * policy.multiplier()
    } else {
        target.value
    };
    PartialCommand::new().with(target.channel, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(deadzone: f64) -> MapperPolicy {
        MapperPolicy {
            deadzone,
            speed_mode: SpeedMode::Fast,
            ..Default::default()
        }
    }

    fn stick() -> StickRoutes {
        StickRoutes {
            x: Some(AxisRoute::new(CommandChannel::LINEAR_X, 1.0)),
            y: Some(AxisRoute::new(CommandChannel::ANGULAR_Z, 1.0)),
        }
    }

    #[test]
    fn full_deflection_scenario() {
        let partial = map_stick(&PointerSample::normalized(1.0, 0.0), &stick(), &fast_policy(0.05)).unwrap();
        assert_eq!(partial.get(CommandChannel::LINEAR_X), Some(1.0));
        assert_eq!(partial.get(CommandChannel::ANGULAR_Z), Some(0.0));
        assert_eq!(partial.len(), 2);
    }

    #[test]
    fn inside_deadzone_is_exactly_zero() {
        for x in [0.0, 0.01, -0.049, 0.0499] {
            assert_eq!(apply_deadzone(x, 0.05, 1.0), 0.0);
        }
    }

    #[test]
    fn deadzone_is_continuous_and_monotonic() {
        let eps = 0.05;
        assert!(apply_deadzone(eps, eps, 1.0).abs() < 1e-12);
        assert!((apply_deadzone(1.0, eps, 1.0) - 1.0).abs() < 1e-12);

        let mut previous = 0.0;
        for i in 0..=1000 {
            let x = eps + (1.0 - eps) * f64::from(i) / 1000.0;
            let y = apply_deadzone(x, eps, 1.0);
            assert!(y >= previous, "not monotonic at {x}");
            assert!(y - previous < 0.002, "jump at {x}");
            previous = y;
        }
    }

    #[test]
    fn deadzone_is_odd() {
        for x in [0.1, 0.5, 0.9] {
            assert_eq!(apply_deadzone(-x, 0.05, 2.0), -apply_deadzone(x, 0.05, 2.0));
        }
    }

    #[test]
    fn widget_units_are_normalised_and_clamped() {
        assert_eq!(normalize(Some(50.0), Some(100.0)).unwrap(), 0.5);
        assert_eq!(normalize(Some(-250.0), Some(100.0)).unwrap(), -1.0);
    }

    #[test]
    fn invalid_samples_are_rejected() {
        let policy = MapperPolicy::default();
        let bad = [
            PointerSample { x: None, y: Some(0.0), size: Some(1.0) },
            PointerSample { x: Some(f64::NAN), y: Some(0.0), size: Some(1.0) },
            PointerSample { x: Some(0.1), y: Some(f64::INFINITY), size: Some(1.0) },
            PointerSample::new(0.1, 0.1, 0.0),
            PointerSample { x: Some(0.1), y: Some(0.1), size: None },
        ];
        for sample in bad {
            assert!(matches!(
                map_stick(&sample, &stick(), &policy),
                Err(TeleopError::InvalidSample(_))
            ));
        }
    }

    #[test]
    fn speed_mode_scales_output() {
        let routes = stick();
        let sample = PointerSample::normalized(1.0, 0.0);
        let mut policy = fast_policy(0.0);
        let fast = map_stick(&sample, &routes, &policy).unwrap();
        policy.speed_mode = SpeedMode::Slow;
        let slow = map_stick(&sample, &routes, &policy).unwrap();

        assert_eq!(fast.get(CommandChannel::LINEAR_X), Some(1.0));
        assert_eq!(slow.get(CommandChannel::LINEAR_X), Some(0.25));
    }

    #[test]
    fn inverted_axis_flips_sign() {
        let routes = StickRoutes {
            x: None,
            y: Some(AxisRoute::new(CommandChannel::LINEAR_X, 0.5).inverted()),
        };
        // Pointer pushed up: negative screen y.
        let partial = map_stick(&PointerSample::normalized(0.0, -1.0), &routes, &fast_policy(0.05)).unwrap();
        assert_eq!(partial.get(CommandChannel::LINEAR_X), Some(0.5));
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn button_follows_frame_when_routed() {
        let route = ButtonRoute::new(CommandChannel::LINEAR_X, 0.4).with_tool(CommandChannel::LINEAR_Z, 0.4);
        let mut policy = fast_policy(0.05);
        assert_eq!(map_button(&route, &policy).get(CommandChannel::LINEAR_X), Some(0.4));

        policy.frame = ReferenceFrame::Tool;
        let partial = map_button(&route, &policy);
        assert_eq!(partial.get(CommandChannel::LINEAR_Z), Some(0.4));
        assert_eq!(partial.get(CommandChannel::LINEAR_X), None);
    }

    #[test]
    fn unscaled_button_ignores_speed_mode() {
        let route = ButtonRoute::new(CommandChannel::Button(3), 1.0).unscaled();
        let policy = MapperPolicy {
            speed_mode: SpeedMode::Slow,
            ..Default::default()
        };
        assert_eq!(map_button(&route, &policy).get(CommandChannel::Button(3)), Some(1.0));
    }

    #[test]
    fn stick_routes_report_owned_channels() {
        assert_eq!(stick().channels(), vec![CommandChannel::LINEAR_X, CommandChannel::ANGULAR_Z]);
        assert!(StickRoutes::default().channels().is_empty());
    }
}
