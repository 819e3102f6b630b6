use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the startup exchange. Always fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("magic cookie {key} is not set")]
    CookieMissing { key: String },

    #[error("magic cookie {key} does not match the expected value")]
    CookieMismatch { key: String },

    #[error("unsupported core protocol version {got} (expected {expected})")]
    UnsupportedCoreVersion { got: u32, expected: u32 },

    #[error("unsupported plugin protocol version {got} (host supports {supported:?})")]
    UnsupportedVersion { got: u32, supported: Vec<u32> },

    #[error("no common protocol version (plugin {plugin}, host {host:?})")]
    NoCommonVersion { plugin: u32, host: Vec<u32> },

    #[error("malformed handshake line: {0}")]
    Malformed(String),

    #[error("plugin exited before completing the handshake")]
    PluginExited,

    #[error("invalid handshake state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

/// Failures of the channel itself, as opposed to the plugin's logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("io error: {0}")]
    Io(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("remote error: {0}")]
    Remote(String),

    /// A line longer than the frame limit. `id` is recovered from its prefix when possible.
    #[error("frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        len: usize,
        limit: usize,
        id: Option<u64>,
    },
}

impl TransportError {
    /// True when the channel can no longer carry calls.
    ///
    /// An oversized frame with no recoverable id cannot be answered, so it ends the channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ChannelClosed
                | TransportError::Io(_)
                | TransportError::FrameTooLarge { id: None, .. }
        )
    }
}

/// Categories of plugin-logic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityErrorKind {
    NotImplemented,
    StateStore,
    InvalidRequest,
    Internal,
}

/// A plugin's own logic failure. Local to one call; serialized across the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_implemented() -> Self {
        Self::new(CapabilityErrorKind::NotImplemented, "not implemented")
    }

    pub fn state_store(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::StateStore, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Internal, message)
    }
}

/// Top-level error for any call through the capability contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// A plugin process was asked to serve an empty plugin set.
    #[error("no plugins registered")]
    NoPlugins,
}

impl PluginError {
    pub fn as_capability(&self) -> Option<&CapabilityError> {
        match self {
            PluginError::Capability(e) => Some(e),
            _ => None,
        }
    }

    /// True when the plugin channel is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            PluginError::Handshake(_) | PluginError::NoPlugins => true,
            PluginError::Transport(t) => t.is_fatal(),
            PluginError::Capability(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_displays_message_verbatim() {
        let err = PluginError::from(CapabilityError::state_store("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transport_fatality() {
        assert!(TransportError::ChannelClosed.is_fatal());
        assert!(!TransportError::Decode("bad json".into()).is_fatal());
        assert!(!TransportError::Timeout(std::time::Duration::from_secs(1)).is_fatal());
        let answerable = TransportError::FrameTooLarge {
            len: 40,
            limit: 16,
            id: Some(3),
        };
        assert!(!answerable.is_fatal());
        let orphaned = TransportError::FrameTooLarge {
            len: 40,
            limit: 16,
            id: None,
        };
        assert!(orphaned.is_fatal());
    }

    #[test]
    fn test_capability_error_wire_format() {
        let json = serde_json::to_value(CapabilityError::not_implemented()).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "not_implemented", "message": "not implemented"}));
    }
}
