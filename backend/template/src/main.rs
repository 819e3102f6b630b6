use std::process::ExitCode;

use runbridge_core::HandshakeConfig;
use runbridge_logging::{init_logger, LogOptions};
use runbridge_plugins::{run, PluginSet, ServeConfig};

#[tokio::main]
async fn main() -> ExitCode {
    init_logger(&LogOptions::plugin("info"));
    let plugins = PluginSet::single(template_plugin::template_capability);
    run(ServeConfig::new(HandshakeConfig::default(), plugins)).await
}
