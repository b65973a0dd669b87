//! Persisted world records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use worldgate_core::{VersionRequest, WorldId};

/// Metadata key marking a world the gateway should keep served.
pub const GATEWAY_ACTIVE: &str = "gatewayActive";

/// Catalog entry for one world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    /// Taken from the request path when written through the API.
    #[serde(default)]
    pub id: WorldId,
    #[serde(default)]
    pub name: String,
    pub commit_sha: String,
    pub game_version: String,
    /// Free-form metadata; `gatewayActive` is interpreted by the gateway.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Unix timestamp (seconds) of the last update.
    #[serde(default)]
    pub updated_at: u64,
}

impl WorldRecord {
    pub fn new(id: WorldId, commit_sha: impl Into<String>, game_version: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            commit_sha: commit_sha.into(),
            game_version: game_version.into(),
            meta: Map::new(),
            updated_at: 0,
        }
    }

    /// Whether the gateway had this world active.
    pub fn is_gateway_active(&self) -> bool {
        self.meta.get(GATEWAY_ACTIVE).is_some_and(is_truthy)
    }

    pub fn set_gateway_active(&mut self, active: bool) {
        self.meta.insert(GATEWAY_ACTIVE.to_string(), Value::Bool(active));
    }

    /// The version request that brings this world back up.
    pub fn version_request(&self) -> VersionRequest {
        VersionRequest::new(self.commit_sha.clone(), self.game_version.clone())
    }
}

/// Lenient flag parsing: `true`, any non-zero number, or the strings
/// `"true"` (any case) and `"1"`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f as i64 != 0),
        Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}
