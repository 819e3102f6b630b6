//! Structured Logger
//!
//! Wraps `tracing` with a console layer, an optional rolling NDJSON file and
//! environment-based level control.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    /// Required for plugin processes.
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    pub console: ConsoleTarget,
    /// Emit console lines as JSON.
    pub json: bool,
    /// Directory for daily-rolling `<file_prefix>.YYYY-MM-DD` NDJSON files.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleTarget::Stdout,
            json: false,
            log_dir: None,
            file_prefix: "runbridge.log".to_string(),
        }
    }
}

impl LogOptions {
    /// Settings for a plugin process: plain lines on stderr, no file.
    pub fn plugin(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            console: ConsoleTarget::Stderr,
            ..Self::default()
        }
    }
}

/// Initialize the global subscriber. A second call is a no-op.
pub fn init_logger(options: &LogOptions) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let console_layer = match (options.console, options.json) {
        (ConsoleTarget::Stdout, false) => fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .boxed(),
        (ConsoleTarget::Stdout, true) => fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .boxed(),
        (ConsoleTarget::Stderr, false) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(false)
            .boxed(),
        (ConsoleTarget::Stderr, true) => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file_layer = options.log_dir.as_ref().map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, &options.file_prefix);
        fmt::layer()
            .json()
            .with_writer(appender)
            .with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
