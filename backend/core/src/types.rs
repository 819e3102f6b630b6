use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static metadata a plugin returns from `Info`.
///
/// The host queries it once per plugin lifetime and caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    pub version: String,
    pub author: String,
    pub action: ActionDescriptor,
    #[serde(default)]
    pub endpoints: PayloadEndpoints,
}

impl CapabilityDescriptor {
    /// Whether the plugin accepts inbound payloads at all.
    pub fn handles_payloads(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

/// What sort of plugin this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Action,
    Payload,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Action => write!(f, "action"),
            PluginKind::Payload => write!(f, "payload"),
            PluginKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// The single action a plugin declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    /// Plugin id the host uses to route steps to this action.
    pub plugin: String,
    pub icon: String,
    pub category: String,
    #[serde(default)]
    pub params: Vec<ParamDeclaration>,
}

/// One typed parameter an action accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDeclaration {
    pub key: String,
    /// Free-form type tag, e.g. "text".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Inbound payload endpoints a plugin declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEndpoints {
    #[serde(default)]
    pub endpoints: Vec<PayloadEndpoint>,
}

impl PayloadEndpoints {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEndpoint {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// Settings a plugin needs to reach external services (the execution-state store).
///
/// Shipped by value inside every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the backend API.
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub runner_id: String,
    /// Timeout for a single state-store call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A resolved key/value pair attached to a step's action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParam {
    pub key: String,
    pub value: String,
}

impl ActionParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The action invocation carried by a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<ActionParam>,
}

impl StepAction {
    /// Linear lookup of a parameter value. Missing keys yield an empty string;
    /// with duplicate keys the last one wins.
    pub fn param(&self, key: &str) -> &str {
        self.params
            .iter()
            .rev()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }
}

/// The workflow instance a step belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    #[serde(default)]
    pub flow_id: Option<Uuid>,
}

/// One step of an execution, as scheduled by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: Uuid,
    #[serde(default)]
    pub action: StepAction,
}

/// Snapshot handed to `ExecuteTask`. Read-only from the plugin's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    pub config: ServiceConfig,
    pub execution: Execution,
    pub step: ExecutionStep,
}

/// Input to `HandlePayload`: a raw inbound payload for one declared endpoint.
///
/// `body` travels as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadHandlerRequest {
    pub config: ServiceConfig,
    pub endpoint: String,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Outcome of `ExecuteTask` / `HandlePayload`. Errors travel separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
}

impl Response {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}

/// Step status as recorded in the execution-state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Body of an `UpdateStep` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub id: Uuid,
    pub messages: Vec<String>,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_lookup_missing_key_is_empty() {
        let action = StepAction {
            name: "Template".into(),
            params: vec![ActionParam::new("Param1", "hello")],
        };
        assert_eq!(action.param("Param1"), "hello");
        assert_eq!(action.param("Param2"), "");
    }

    #[test]
    fn test_param_lookup_duplicate_keys_last_wins() {
        let action = StepAction {
            name: String::new(),
            params: vec![ActionParam::new("k", "first"), ActionParam::new("k", "second")],
        };
        assert_eq!(action.param("k"), "second");
    }

    #[test]
    fn test_plugin_kind_serialization() {
        assert_eq!(serde_json::to_string(&PluginKind::Action).unwrap(), "\"action\"");
        let other: PluginKind = serde_json::from_str("\"notifier\"").unwrap();
        assert_eq!(other, PluginKind::Other("notifier".into()));
        assert_eq!(other.to_string(), "notifier");
    }

    #[test]
    fn test_descriptor_without_endpoints_field() {
        let json = serde_json::json!({
            "name": "Template",
            "type": "action",
            "version": "1.1.0",
            "author": "JustNZ",
            "action": {
                "name": "Template",
                "description": "d",
                "plugin": "template",
                "icon": "i",
                "category": "c",
                "params": [{"key": "Param1", "type": "text"}]
            }
        });
        let desc: CapabilityDescriptor = serde_json::from_value(json).unwrap();
        assert!(!desc.handles_payloads());
        assert_eq!(desc.action.params[0].default, "");
        assert!(!desc.action.params[0].required);
    }

    #[test]
    fn test_payload_body_travels_as_base64() {
        let request = PayloadHandlerRequest {
            config: service_config(),
            endpoint: "hook".into(),
            body: vec![0, 255, b'{', b'}'],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["body"], "AP97fQ==");

        let back: PayloadHandlerRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);

        let bad = serde_json::json!({"config": json_config(), "endpoint": "hook", "body": "%%"});
        assert!(serde_json::from_value::<PayloadHandlerRequest>(bad).is_err());
        let missing = serde_json::json!({"config": json_config(), "endpoint": "hook"});
        let decoded: PayloadHandlerRequest = serde_json::from_value(missing).unwrap();
        assert!(decoded.body.is_empty());
    }

    fn service_config() -> ServiceConfig {
        ServiceConfig {
            url: "http://api.local".into(),
            api_key: "key".into(),
            runner_id: "runner-1".into(),
            timeout_secs: 30,
        }
    }

    fn json_config() -> serde_json::Value {
        serde_json::to_value(service_config()).unwrap()
    }

    #[test]
    fn test_service_config_default_timeout() {
        let cfg: ServiceConfig =
            serde_json::from_str(r#"{"url":"http://localhost","api_key":"k"}"#).unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_step_status_wire_format() {
        assert_eq!(serde_json::to_string(&StepStatus::Success).unwrap(), "\"success\"");
        assert_eq!(StepStatus::Failure.to_string(), "failure");
    }
}
