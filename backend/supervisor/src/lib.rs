//! Host side of the plugin protocol.
//!
//! [`launch`] starts one plugin executable, verifies its handshake line and
//! returns a [`PluginClient`] from which named capability stubs are
//! dispensed. [`PluginManager`] does the same for a whole directory and
//! keeps each plugin's `Info` descriptor.

pub mod error;
pub mod manager;
pub mod process;

pub use error::SupervisorError;
pub use manager::{discover, ManagedPlugin, PluginManager};
pub use process::{
    launch, HostOptions, PluginClient, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_SHUTDOWN_GRACE,
};
