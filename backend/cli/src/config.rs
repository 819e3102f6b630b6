//! Host settings derived from the loaded config file.

use std::path::{Path, PathBuf};

use anyhow::Result;

use runbridge_config::{config_dir, config_file_path, load_and_prepare, RunbridgeConfig};
use runbridge_logging::{ConsoleTarget, LogOptions};
use runbridge_supervisor::{HostOptions, DEFAULT_HANDSHAKE_TIMEOUT};

/// Load `--config` if given, else `<config dir>/config.yaml` (which may be absent).
pub async fn load(explicit: Option<&Path>) -> Result<RunbridgeConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config_file_path(&config_dir()),
    };
    load_and_prepare(&path).await
}

pub fn host_options(config: &RunbridgeConfig) -> HostOptions {
    HostOptions {
        handshake: config.handshake(),
        supported_versions: config.supported_versions(),
        names: config.plugin_names(),
        call_timeout: config.call_timeout(),
        handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        shutdown_grace: config.shutdown_grace(),
    }
}

/// Host logs go to stderr; stdout carries command output.
pub fn log_options(config: &RunbridgeConfig) -> LogOptions {
    let logging = config.logging.clone().unwrap_or_default();
    LogOptions {
        level: config.log_level().to_string(),
        console: ConsoleTarget::Stderr,
        json: logging.json.unwrap_or(false),
        log_dir: logging.dir.map(PathBuf::from),
        ..LogOptions::default()
    }
}

/// A plugin argument is a path when it names an existing file, else a file in the plugins dir.
pub fn resolve_plugin(config: &RunbridgeConfig, plugin: &str) -> PathBuf {
    let direct = PathBuf::from(plugin);
    if direct.is_file() {
        return direct;
    }
    config.plugins_dir().join(plugin)
}
