//! Channel → message-field mapping.
//!
//! The outbound message schema is an external contract.  A [`MessageLayout`]
//! records it as data: the message type name, a JSON template carrying every
//! field the receiver expects, and one field path per command channel.
//!
//! Field paths are dot-separated object keys, optionally indexed:
//! `linear.x`, `axes[2]`, `buttons[0]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use teleop_types::{CommandChannel, CommandState, TeleopError};

/// `geometry_msgs/msg/Twist` type name.
pub const TWIST_TYPE: &str = "geometry_msgs/msg/Twist";

/// `sensor_msgs/msg/Joy` type name.
pub const JOY_TYPE: &str = "sensor_msgs/msg/Joy";

/// Describes how a [`CommandState`] becomes a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLayout {
    /// Fully qualified message type, e.g. `geometry_msgs/msg/Twist`.
    pub message_type: String,
    /// Body every encoded message starts from.
    #[serde(default = "empty_object")]
    pub template: Value,
    /// Field path of every channel.  The keys are also the channel layout of
    /// the [`CommandState`] built for this message.
    pub fields: BTreeMap<CommandChannel, String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl MessageLayout {
    /// Velocity message: `linear.{x,y,z}` and `angular.{x,y,z}`.
    pub fn twist() -> Self {
        let fields = CommandChannel::TWIST
            .iter()
            .map(|c| (*c, c.to_string()))
            .collect();
        Self {
            message_type: TWIST_TYPE.to_string(),
            template: json!({
                "linear":  { "x": 0.0, "y": 0.0, "z": 0.0 },
                "angular": { "x": 0.0, "y": 0.0, "z": 0.0 }
            }),
            fields,
        }
    }

    /// Generic indexed axes + buttons message.
    pub fn joy(axes: u8, buttons: u8) -> Self {
        let mut fields = BTreeMap::new();
        for i in 0..axes {
            fields.insert(CommandChannel::Axis(i), format!("axes[{i}]"));
        }
        for i in 0..buttons {
            fields.insert(CommandChannel::Button(i), format!("buttons[{i}]"));
        }
        Self {
            message_type: JOY_TYPE.to_string(),
            template: json!({
                "header": { "frame_id": "" },
                "axes": vec![0.0; axes as usize],
                "buttons": vec![0; buttons as usize],
            }),
            fields,
        }
    }

    /// The channels this layout carries, in order.
    pub fn channels(&self) -> impl Iterator<Item = CommandChannel> + '_ {
        self.fields.keys().copied()
    }

    /// A neutral [`CommandState`] over this layout's channels.
    pub fn neutral_state(&self) -> CommandState {
        CommandState::neutral(self.channels())
    }

    /// Encode `state` into a message body.
    ///
    /// Channels of `state` that have no field in this layout are skipped.
    /// Button channels are written as integers.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Serialization`] when a field path is malformed
    /// or collides with a non-object / non-array value of the template.
    pub fn encode(&self, state: &CommandState) -> Result<Value, TeleopError> {
        let mut body = self.template.clone();
        for (channel, value) in state.iter() {
            let Some(path) = self.fields.get(&channel) else {
                continue;
            };
            let encoded = if channel.is_button() {
                Value::from(value.round() as i64)
            } else {
                Value::from(value)
            };
            set_path(&mut body, path, encoded)?;
        }
        Ok(body)
    }
}

/// Split `name[3]` into `("name", Some(3))`.
fn parse_segment<'a>(segment: &'a str, path: &str) -> Result<(&'a str, Option<usize>), TeleopError> {
    let malformed = || TeleopError::Serialization(format!("malformed field path '{path}'"));
    match segment.split_once('[') {
        None if !segment.is_empty() => Ok((segment, None)),
        None => Err(malformed()),
        Some((name, rest)) => {
            let index = rest
                .strip_suffix(']')
                .and_then(|i| i.parse::<usize>().ok())
                .ok_or_else(malformed)?;
            if name.is_empty() {
                return Err(malformed());
            }
            Ok((name, Some(index)))
        }
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), TeleopError> {
    let collision = || TeleopError::Serialization(format!("field path '{path}' collides with template"));

    let mut cursor = root;
    for segment in path.split('.') {
        let (name, index) = parse_segment(segment, path)?;
        if cursor.is_null() {
            *cursor = empty_object();
        }
        let object = cursor.as_object_mut().ok_or_else(collision)?;
        let slot = object.entry(name.to_string()).or_insert_with(|| match index {
            Some(_) => Value::Array(Vec::new()),
            None => Value::Null,
        });
        cursor = match index {
            Some(i) => {
                let array = slot.as_array_mut().ok_or_else(collision)?;
                if array.len() <= i {
                    array.resize(i + 1, Value::from(0));
                }
                &mut array[i]
            }
            None => slot,
        };
    }
    *cursor = value;
    Ok(())
}
