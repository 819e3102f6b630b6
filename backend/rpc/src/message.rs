//! Envelopes exchanged after the handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbridge_core::CapabilityError;

/// Remotely callable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "Plugin.Info")]
    Info,
    #[serde(rename = "Plugin.ExecuteTask")]
    ExecuteTask,
    #[serde(rename = "Plugin.HandlePayload")]
    HandlePayload,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Info => "Plugin.Info",
            Method::ExecuteTask => "Plugin.ExecuteTask",
            Method::HandlePayload => "Plugin.HandlePayload",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host → plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    /// Registered plugin name inside the process.
    pub plugin: String,
    pub method: Method,
    #[serde(default)]
    pub params: Value,
}

/// Plugin → host. `result` is always written, `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn failure(id: u64, result: Value, error: RpcError) -> Self {
        Self {
            id,
            result,
            error: Some(error),
        }
    }
}

/// Error slot of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcError {
    /// The plugin's logic failed; returned verbatim.
    Capability(CapabilityError),
    /// The server could not route or decode the call.
    Transport(String),
}

/// Best-effort recovery of the `id` of an envelope that failed to decode.
pub(crate) fn peek_id(line: &str) -> Option<u64> {
    serde_json::from_str::<Value>(line)
        .ok()?
        .get("id")?
        .as_u64()
}
