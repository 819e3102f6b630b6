//! Structured logging for runbridge hosts and plugin processes.
//!
//! Plugin processes must keep stdout free for the handshake line and RPC
//! traffic, so their console output goes to stderr.

pub mod logger;
pub mod redact;

pub use logger::{init_logger, ConsoleTarget, LogOptions};
pub use redact::{redact_secret, redact_sensitive_data};
