//! Last pause/speed request seen by the relay

use serde::Serialize;
use serde_json::Value;

use super::{CommandKind, ControlCommand};

/// Advisory view of what viewers last asked the engine to do.
///
/// Commands are fire-and-forget, so this reflects requests, not engine state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlStatus {
    pub paused: bool,
    pub speed: f64,
}

impl Default for ControlStatus {
    fn default() -> Self {
        Self {
            paused: false,
            speed: 1.0,
        }
    }
}

impl ControlStatus {
    pub fn apply(&mut self, command: &ControlCommand) {
        match command.kind() {
            CommandKind::Pause => self.paused = true,
            CommandKind::Resume => self.paused = false,
            CommandKind::Speed => {
                // Non-numeric speeds are still forwarded, just not tracked
                if let Some(factor) = command.value().and_then(speed_factor) {
                    self.speed = factor;
                }
            }
            CommandKind::Incident => {}
        }
    }
}

fn speed_factor(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
