//! Config validation: checks with user-friendly error messages.

use crate::schema::RunbridgeConfig;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &RunbridgeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_backend(config, &mut report);
    validate_plugins(config, &mut report);
    report
}

fn validate_backend(config: &RunbridgeConfig, report: &mut ValidationReport) {
    let Some(backend) = &config.backend else { return };
    match backend.url.as_deref().map(str::trim) {
        None | Some("") => report.warn(
            "backend.url",
            "No state store URL configured; ExecuteTask calls will fail",
        ),
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            report.error("backend.url", format!("'{url}' is not an http(s) URL"))
        }
        Some(_) => {}
    }
    if backend.api_key.as_deref().is_none_or(str::is_empty) {
        report.warn("backend.api_key", "No API key configured");
    }
    if backend.timeout_secs == Some(0) {
        report.error("backend.timeout_secs", "timeout_secs must be > 0");
    }
}

fn validate_plugins(config: &RunbridgeConfig, report: &mut ValidationReport) {
    let Some(plugins) = &config.plugins else { return };

    if let Some(hs) = &plugins.handshake {
        if hs.magic_cookie_key.trim().is_empty() {
            report.error("plugins.handshake.magic_cookie_key", "Cookie key cannot be empty");
        }
        if hs.magic_cookie_value.is_empty() {
            report.error(
                "plugins.handshake.magic_cookie_value",
                "Cookie value cannot be empty",
            );
        }
    }
    if let Some(versions) = &plugins.supported_versions {
        if versions.contains(&0) {
            report.error("plugins.supported_versions", "Protocol version 0 is reserved");
        }
    }
    if let Some(names) = &plugins.names {
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                report.error(format!("plugins.names[{i}]"), "Plugin name cannot be empty");
            }
        }
    }
    if plugins.call_timeout_secs == Some(0) {
        report.error("plugins.call_timeout_secs", "call_timeout_secs must be > 0");
    }
}
