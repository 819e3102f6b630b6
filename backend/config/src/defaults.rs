//! Config defaults: applies sensible default values to parsed config.

use runbridge_core::HandshakeConfig;

use crate::schema::{BackendConfig, LoggingConfig, PluginsConfig, RunbridgeConfig};

/// Default state-store request timeout (seconds).
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Default grace period between closing a plugin's stdin and killing it (seconds).
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: RunbridgeConfig) -> RunbridgeConfig {
    let config = apply_backend_defaults(config);
    let config = apply_plugin_defaults(config);
    apply_logging_defaults(config)
}

fn apply_backend_defaults(mut config: RunbridgeConfig) -> RunbridgeConfig {
    let backend = config.backend.get_or_insert_with(BackendConfig::default);
    if backend.timeout_secs.is_none() {
        backend.timeout_secs = Some(DEFAULT_BACKEND_TIMEOUT_SECS);
    }
    config
}

/// Ensure handshake, version list, names, dir and grace are set.
fn apply_plugin_defaults(mut config: RunbridgeConfig) -> RunbridgeConfig {
    let plugins = config.plugins.get_or_insert_with(PluginsConfig::default);
    let handshake = plugins
        .handshake
        .get_or_insert_with(HandshakeConfig::default);
    let version = handshake.protocol_version;

    if plugins.supported_versions.as_ref().is_none_or(Vec::is_empty) {
        plugins.supported_versions = Some(vec![version]);
    }
    if plugins.names.as_ref().is_none_or(Vec::is_empty) {
        plugins.names = Some(vec!["plugin".to_string()]);
    }
    if plugins.dir.is_none() {
        plugins.dir = Some(DEFAULT_PLUGINS_DIR.to_string());
    }
    if plugins.shutdown_grace_secs.is_none() {
        plugins.shutdown_grace_secs = Some(DEFAULT_SHUTDOWN_GRACE_SECS);
    }
    config
}

fn apply_logging_defaults(mut config: RunbridgeConfig) -> RunbridgeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_empty_config() {
        let config = apply_all_defaults(RunbridgeConfig::default());
        let plugins = config.plugins.as_ref().unwrap();
        assert_eq!(plugins.handshake, Some(HandshakeConfig::default()));
        assert_eq!(plugins.supported_versions, Some(vec![1]));
        assert_eq!(plugins.names, Some(vec!["plugin".to_string()]));
        assert_eq!(config.service_config().timeout_secs, DEFAULT_BACKEND_TIMEOUT_SECS);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_defaults_keep_explicit_values() {
        let mut config = RunbridgeConfig::default();
        config.plugins = Some(PluginsConfig {
            supported_versions: Some(vec![1, 2]),
            shutdown_grace_secs: Some(1),
            ..Default::default()
        });
        let config = apply_all_defaults(config);
        assert_eq!(config.supported_versions(), vec![1, 2]);
        assert_eq!(config.shutdown_grace().as_secs(), 1);
    }
}
