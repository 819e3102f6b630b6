use std::path::PathBuf;

use thiserror::Error;

use runbridge_core::{HandshakeError, PluginError, TransportError};

/// Host-side failures while launching or talking to a plugin process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin {path}: handshake failed: {source}")]
    Handshake {
        path: PathBuf,
        #[source]
        source: HandshakeError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("plugin {path} refused: {source}")]
    Refused {
        path: PathBuf,
        #[source]
        source: PluginError,
    },

    #[error("no plugin named {0}")]
    NotFound(String),

    #[error("failed to scan plugin directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
