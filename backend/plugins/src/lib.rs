//! Plugin-side runtime: register capability implementations under names and
//! serve them to a host over stdio.

pub mod registry;
pub mod serve;

pub use registry::{CapabilityFactory, PluginSet, DEFAULT_PLUGIN_NAME};
pub use serve::{run, serve, serve_with, ServeConfig, DIRECT_INVOCATION_NOTICE};
