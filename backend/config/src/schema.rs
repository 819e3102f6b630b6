//! Runbridge host configuration schema.
//!
//! Every leaf is optional in the file; `defaults::apply_all_defaults` fills
//! the gaps and the accessors below read the filled values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use runbridge_core::{HandshakeConfig, ServiceConfig};

use crate::defaults::{
    DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_LOG_LEVEL, DEFAULT_PLUGINS_DIR,
    DEFAULT_SHUTDOWN_GRACE_SECS,
};

/// Root configuration for a runbridge host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunbridgeConfig {
    /// Execution-state store the plugins report to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    /// Plugin discovery, handshake and call limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginsConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
    /// Timeout for each state-store request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for plugin executables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<HandshakeConfig>,
    /// Application protocol versions the host accepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<u32>>,
    /// Names the host may dispense from each plugin process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    /// Per-call RPC timeout; unset means calls wait for the plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    /// How long a plugin gets to exit after its stdin is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl RunbridgeConfig {
    /// Settings shipped to plugins inside every request.
    pub fn service_config(&self) -> ServiceConfig {
        let backend = self.backend.clone().unwrap_or_default();
        ServiceConfig {
            url: backend.url.unwrap_or_default(),
            api_key: backend.api_key.unwrap_or_default(),
            runner_id: backend.runner_id.unwrap_or_default(),
            timeout_secs: backend.timeout_secs.unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS),
        }
    }

    pub fn handshake(&self) -> HandshakeConfig {
        self.plugins
            .as_ref()
            .and_then(|p| p.handshake.clone())
            .unwrap_or_default()
    }

    pub fn supported_versions(&self) -> Vec<u32> {
        self.plugins
            .as_ref()
            .and_then(|p| p.supported_versions.clone())
            .unwrap_or_else(|| vec![self.handshake().protocol_version])
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .as_ref()
            .and_then(|p| p.names.clone())
            .unwrap_or_else(|| vec!["plugin".to_string()])
    }

    pub fn plugins_dir(&self) -> PathBuf {
        PathBuf::from(
            self.plugins
                .as_ref()
                .and_then(|p| p.dir.as_deref())
                .unwrap_or(DEFAULT_PLUGINS_DIR),
        )
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.plugins
            .as_ref()
            .and_then(|p| p.call_timeout_secs)
            .map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(
            self.plugins
                .as_ref()
                .and_then(|p| p.shutdown_grace_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        )
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
