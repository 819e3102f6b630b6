mod config;
mod list_cmd;
mod plugin_cmd;
mod terminal_output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use runbridge_core::ActionParam;
use runbridge_logging::{init_logger, redact_secret};
use tracing::debug;

use plugin_cmd::{parse_param, ExecArgs};
use terminal_output::note_error;

#[derive(Parser)]
#[command(name = "runbridge")]
#[command(about = "Launch and drive runbridge action plugins")]
#[command(version)]
struct Cli {
    /// Config file (default: $RUNBRIDGE_CONFIG_DIR/config.yaml or ~/.runbridge/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a plugin's descriptor
    Info {
        /// Executable path, or a file name inside the plugins dir
        plugin: String,
        /// Name the plugin is registered under inside its process
        #[arg(long, default_value = "plugin")]
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Run one step through a plugin
    Exec {
        plugin: String,
        #[arg(long, default_value = "plugin")]
        name: String,
        #[arg(long)]
        execution_id: Option<Uuid>,
        #[arg(long)]
        step_id: Option<Uuid>,
        /// Action name recorded on the step
        #[arg(long, default_value = "")]
        action: String,
        /// Step parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<ActionParam>,
    },
    /// Deliver an inbound payload to a plugin
    Payload {
        plugin: String,
        #[arg(long, default_value = "plugin")]
        name: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Start every plugin in the plugins dir and list their descriptors
    List {
        /// Override the configured plugins dir
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match config::load(cli.config.as_deref()).await {
        Ok(c) => c,
        Err(e) => {
            note_error(&format!("{e:#}"));
            return Ok(ExitCode::FAILURE);
        }
    };
    init_logger(&config::log_options(&config));
    let service = config.service_config();
    debug!(
        url = %service.url,
        api_key = %redact_secret(&service.api_key),
        runner_id = %service.runner_id,
        "config loaded"
    );

    let ok = match cli.command {
        Commands::Info { plugin, name, json } => {
            plugin_cmd::info(&config, &plugin, &name, json).await?
        }
        Commands::Exec {
            plugin,
            name,
            execution_id,
            step_id,
            action,
            params,
        } => {
            let args = ExecArgs {
                execution_id,
                step_id,
                action,
                params,
            };
            plugin_cmd::exec(&config, &plugin, &name, args).await?
        }
        Commands::Payload {
            plugin,
            name,
            endpoint,
            body,
        } => plugin_cmd::payload(&config, &plugin, &name, endpoint, body.into_bytes()).await?,
        Commands::List { dir } => list_cmd::run(&config, dir).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_collects_params() {
        let cli = Cli::parse_from([
            "runbridge",
            "exec",
            "template",
            "--param",
            "Param1=hello",
            "--param",
            "Other=x",
            "--step-id",
            "00000000-0000-0000-0000-000000000001",
        ]);
        match cli.command {
            Commands::Exec { params, step_id, .. } => {
                assert_eq!(params.len(), 2);
                assert_eq!(params[0], ActionParam::new("Param1", "hello"));
                assert_eq!(step_id, Some(Uuid::from_u128(1)));
            }
            _ => panic!("expected exec"),
        }
    }
}
