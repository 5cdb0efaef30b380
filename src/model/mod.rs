//! Simulation data relayed between the engine and viewers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Latest simulation snapshot as produced by the engine.
///
/// The relay only checks that the payload is a JSON object; the fields
/// (`vehicles`, metrics, ...) are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationState(Map<String, Value>);

impl SimulationState {
    /// Decode a record payload, rejecting anything that is not a JSON object
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Look up a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Number of entries in the `vehicles` list, if present
    pub fn vehicle_count(&self) -> usize {
        self.get("vehicles")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl From<Map<String, Value>> for SimulationState {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Static road network served by the engine's `/map` endpoint.
///
/// Only the `roads` list is required to be an array; roads and any other
/// fields are relayed exactly as the engine sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTopology {
    #[serde(default)]
    pub roads: Vec<Road>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One road segment (`id`, `startX`, `startY`, `endX`, `endY`, `lanes`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Road(Value);

impl Road {
    /// Look up a field of the road, if it is an object
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}
