//! Command channels and the composite outbound command.
//!
//! A [`CommandState`] is the last-known value of every channel of one
//! outbound message.  Input sources never write it wholesale; they produce a
//! [`PartialCommand`] naming only the channels they own, and the state merges
//! it channel by channel.  When two sources address the same channel the last
//! merge wins.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TeleopError;

/// Component of a three-axis vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis3 {
    X,
    Y,
    Z,
}

impl Axis3 {
    fn as_str(self) -> &'static str {
        match self {
            Axis3::X => "x",
            Axis3::Y => "y",
            Axis3::Z => "z",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "x" => Some(Axis3::X),
            "y" => Some(Axis3::Y),
            "z" => Some(Axis3::Z),
            _ => None,
        }
    }
}

/// One addressable scalar field of the outbound command message.
///
/// The textual form (`linear.x`, `angular.z`, `axis3`, `button2`) is what
/// configuration files use; it round-trips through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CommandChannel {
    Linear(Axis3),
    Angular(Axis3),
    /// Indexed analog axis of a generic axes+buttons message.
    Axis(u8),
    /// Indexed discrete button of a generic axes+buttons message.
    Button(u8),
}

impl CommandChannel {
    pub const LINEAR_X: Self = CommandChannel::Linear(Axis3::X);
    pub const LINEAR_Y: Self = CommandChannel::Linear(Axis3::Y);
    pub const LINEAR_Z: Self = CommandChannel::Linear(Axis3::Z);
    pub const ANGULAR_X: Self = CommandChannel::Angular(Axis3::X);
    pub const ANGULAR_Y: Self = CommandChannel::Angular(Axis3::Y);
    pub const ANGULAR_Z: Self = CommandChannel::Angular(Axis3::Z);

    /// The six channels of a velocity (twist) message, in field order.
    pub const TWIST: [Self; 6] = [
        Self::LINEAR_X,
        Self::LINEAR_Y,
        Self::LINEAR_Z,
        Self::ANGULAR_X,
        Self::ANGULAR_Y,
        Self::ANGULAR_Z,
    ];

    /// `true` for discrete button channels.
    pub fn is_button(&self) -> bool {
        matches!(self, CommandChannel::Button(_))
    }
}

impl fmt::Display for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandChannel::Linear(a) => write!(f, "linear.{}", a.as_str()),
            CommandChannel::Angular(a) => write!(f, "angular.{}", a.as_str()),
            CommandChannel::Axis(i) => write!(f, "axis{i}"),
            CommandChannel::Button(i) => write!(f, "button{i}"),
        }
    }
}

impl FromStr for CommandChannel {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || TeleopError::Config(format!("unknown command channel '{s}'"));

        if let Some(axis) = s.strip_prefix("linear.") {
            return Axis3::parse(axis).map(CommandChannel::Linear).ok_or_else(invalid);
        }
        if let Some(axis) = s.strip_prefix("angular.") {
            return Axis3::parse(axis).map(CommandChannel::Angular).ok_or_else(invalid);
        }
        if let Some(idx) = s.strip_prefix("button") {
            return idx.parse().map(CommandChannel::Button).map_err(|_| invalid());
        }
        if let Some(idx) = s.strip_prefix("axis") {
            return idx.parse().map(CommandChannel::Axis).map_err(|_| invalid());
        }
        Err(invalid())
    }
}

impl TryFrom<String> for CommandChannel {
    type Error = TeleopError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandChannel> for String {
    fn from(value: CommandChannel) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// PartialCommand
// ---------------------------------------------------------------------------

/// The contribution of one input source: only the channels it owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialCommand {
    values: BTreeMap<CommandChannel, f64>,
}

impl PartialCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, channel: CommandChannel, value: f64) -> Self {
        self.values.insert(channel, value);
        self
    }

    pub fn set(&mut self, channel: CommandChannel, value: f64) {
        self.values.insert(channel, value);
    }

    pub fn get(&self, channel: CommandChannel) -> Option<f64> {
        self.values.get(&channel).copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = CommandChannel> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandChannel, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

// ---------------------------------------------------------------------------
// CommandState
// ---------------------------------------------------------------------------

/// The full outbound message body: an ordered map over a fixed channel
/// layout.
///
/// The layout is fixed at construction.  Merges only ever touch channels of
/// the layout; anything else is reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    values: BTreeMap<CommandChannel, f64>,
}

impl CommandState {
    /// A state over `layout` with every channel neutral (0.0).
    pub fn neutral<I>(layout: I) -> Self
    where
        I: IntoIterator<Item = CommandChannel>,
    {
        Self {
            values: layout.into_iter().map(|c| (c, 0.0)).collect(),
        }
    }

    pub fn get(&self, channel: CommandChannel) -> Option<f64> {
        self.values.get(&channel).copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = CommandChannel> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandChannel, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge `partial` in place.
    ///
    /// Replaces exactly the channels named by `partial`; every other channel
    /// keeps its value.  Returns the channels of `partial` that are not part
    /// of this state's layout (they are ignored).
    pub fn merge(&mut self, partial: &PartialCommand) -> Vec<CommandChannel> {
        let mut ignored = Vec::new();
        for (channel, value) in partial.iter() {
            match self.values.get_mut(&channel) {
                Some(slot) => *slot = value,
                None => ignored.push(channel),
            }
        }
        ignored
    }

    /// Pure form of [`merge`][Self::merge]: `merge(current, partial) -> next`.
    pub fn merged(&self, partial: &PartialCommand) -> Self {
        let mut next = self.clone();
        next.merge(partial);
        next
    }

    /// `true` when every channel is exactly zero.
    pub fn is_neutral(&self) -> bool {
        self.values.values().all(|v| *v == 0.0)
    }

    /// A copy of this state with every channel forced to neutral.
    pub fn to_neutral(&self) -> Self {
        Self::neutral(self.channels())
    }

    /// Force every channel to neutral in place.
    pub fn reset(&mut self) {
        for v in self.values.values_mut() {
            *v = 0.0;
        }
    }

    /// Zero the given channels (those in the layout), leaving the rest.
    pub fn zero<I>(&mut self, channels: I)
    where
        I: IntoIterator<Item = CommandChannel>,
    {
        for channel in channels {
            if let Some(slot) = self.values.get_mut(&channel) {
                *slot = 0.0;
            }
        }
    }
}
