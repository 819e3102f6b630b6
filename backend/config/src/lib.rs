//! `runbridge-config`: host configuration for runbridge.
//!
//! Provides:
//! - Typed config schema (state store, plugin launch, logging)
//! - YAML loading from `~/.runbridge/config.yaml` or `RUNBRIDGE_CONFIG_DIR`
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config, load_raw};
pub use schema::{BackendConfig, LoggingConfig, PluginsConfig, RunbridgeConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load, apply env substitution and defaults, then validate.
///
/// This is the main entry point for loading a config at runtime. Validation
/// errors abort; warnings are logged.
pub async fn load_and_prepare(path: &Path) -> Result<RunbridgeConfig> {
    let value = load_raw(path).await?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: RunbridgeConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    if let Some(first) = report.errors.first() {
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        bail!("{first}");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_and_prepare_substitutes_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "backend:\n  url: http://store.local\n  api_key: ${RUNBRIDGE_TEST_PREPARE_KEY}\n",
        )
        .unwrap();
        std::env::set_var("RUNBRIDGE_TEST_PREPARE_KEY", "secret-key");

        let config = load_and_prepare(&path).await.unwrap();
        let service = config.service_config();
        assert_eq!(service.api_key, "secret-key");
        assert_eq!(service.timeout_secs, 30);
        assert_eq!(config.handshake().magic_cookie_value, "hello");
    }

    #[tokio::test]
    async fn test_load_and_prepare_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "plugins:\n  supported_versions: [0]\n").unwrap();
        let err = load_and_prepare(&path).await.unwrap_err();
        assert!(err.to_string().contains("plugins.supported_versions"));
    }
}
