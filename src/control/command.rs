//! Operator commands sent by viewers

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Kinds of command a viewer may send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Pause,
    Resume,
    /// Simulation speed multiplier in `value`
    Speed,
    /// Incident description, routed to `/incident`
    Incident,
}

impl CommandKind {
    fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "pause" => Some(CommandKind::Pause),
            "resume" => Some(CommandKind::Resume),
            "speed" => Some(CommandKind::Speed),
            "incident" => Some(CommandKind::Incident),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Speed => "speed",
            CommandKind::Incident => "incident",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A viewer command, forwarded to the engine at most once.
///
/// Only `type` is interpreted. The whole object, `value` and any other
/// fields included, is posted upstream unchanged; the engine decides what
/// a payload means.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ControlCommand {
    kind: CommandKind,
    body: Map<String, Value>,
}

impl ControlCommand {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The `value` field, if the viewer sent one
    pub fn value(&self) -> Option<&Value> {
        self.body.get("value")
    }

    /// Incidents go to `/incident`, everything else to `/control`
    pub fn is_incident(&self) -> bool {
        self.kind == CommandKind::Incident
    }
}

impl TryFrom<Map<String, Value>> for ControlCommand {
    type Error = CommandError;

    fn try_from(body: Map<String, Value>) -> Result<Self, Self::Error> {
        let kind = match body.get("type") {
            Some(Value::String(kind)) => {
                CommandKind::from_wire(kind).ok_or_else(|| CommandError::UnknownType(kind.clone()))?
            }
            _ => return Err(CommandError::MissingType),
        };
        Ok(Self { kind, body })
    }
}

impl Serialize for ControlCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// Rejected command messages
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command has no string `type` field")]
    MissingType,

    #[error("unknown command type: {0}")]
    UnknownType(String),
}
