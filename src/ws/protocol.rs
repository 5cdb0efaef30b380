//! WebSocket protocol message definitions
//! These are the wire types between the relay and viewer front ends

use serde::Serialize;

use crate::model::{MapTopology, SimulationState};

/// Messages sent from client to server are [`ControlCommand`]s:
/// `{"type": "pause"|"resume"|"speed"|"incident", ...}` with any further fields
pub use crate::control::ControlCommand as ClientMsg;

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg<'a> {
    /// Latest simulation state
    StateUpdate(&'a SimulationState),

    /// Road network, sent once on connect when known
    Map(&'a MapTopology),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_update_shape() {
        let state: SimulationState =
            serde_json::from_value(json!({"vehicles": [{"id": "v1", "x": 50}]})).unwrap();
        let msg = serde_json::to_value(ServerMsg::StateUpdate(&state)).unwrap();
        assert_eq!(
            msg,
            json!({"type": "state_update", "data": {"vehicles": [{"id": "v1", "x": 50}]}})
        );
    }

    #[test]
    fn map_shape() {
        let map: MapTopology = serde_json::from_value(json!({"roads": []})).unwrap();
        let msg = serde_json::to_value(ServerMsg::Map(&map)).unwrap();
        assert_eq!(msg, json!({"type": "map", "data": {"roads": []}}));
    }
}
