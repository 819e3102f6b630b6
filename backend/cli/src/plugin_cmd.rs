//! `info`, `exec` and `payload`: launch one plugin, make one call, shut it down.

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use runbridge_config::RunbridgeConfig;
use runbridge_core::{
    ActionParam, Capability, ExecuteTaskRequest, Execution, ExecutionStep, PayloadHandlerRequest,
    PluginError, Response, StepAction,
};
use runbridge_supervisor::{launch, PluginClient};

use crate::config::{host_options, resolve_plugin};
use crate::terminal_output::{note_error, note_success, render_descriptor};

/// Parse a `key=value` step parameter. The value may itself contain `=`.
pub fn parse_param(raw: &str) -> Result<ActionParam, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(ActionParam::new(key, value)),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

async fn start(config: &RunbridgeConfig, plugin: &str) -> Result<PluginClient> {
    let path = resolve_plugin(config, plugin);
    launch(&path, &[], &host_options(config))
        .await
        .with_context(|| format!("failed to start plugin {}", path.display()))
}

async fn stop(config: &RunbridgeConfig, client: PluginClient) {
    if let Err(e) = client.shutdown(config.shutdown_grace()).await {
        warn!(plugin = %client.label(), error = %e, "plugin shutdown failed");
    }
}

pub async fn info(config: &RunbridgeConfig, plugin: &str, name: &str, json: bool) -> Result<bool> {
    let client = start(config, plugin).await?;
    let result = match client.dispense(name) {
        Ok(stub) => stub.info().await,
        Err(e) => {
            stop(config, client).await;
            return Err(e.into());
        }
    };
    stop(config, client).await;

    match result {
        Ok(descriptor) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                print!("{}", render_descriptor(&descriptor));
            }
            Ok(true)
        }
        Err(e) => {
            note_error(&format!("Info failed: {e}"));
            Ok(false)
        }
    }
}

pub struct ExecArgs {
    pub execution_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub action: String,
    pub params: Vec<ActionParam>,
}

pub async fn exec(config: &RunbridgeConfig, plugin: &str, name: &str, args: ExecArgs) -> Result<bool> {
    let request = ExecuteTaskRequest {
        config: config.service_config(),
        execution: Execution {
            id: args.execution_id.unwrap_or_else(Uuid::new_v4),
            flow_id: None,
        },
        step: ExecutionStep {
            id: args.step_id.unwrap_or_else(Uuid::new_v4),
            action: StepAction {
                name: args.action,
                params: args.params,
            },
        },
    };
    info!(
        execution_id = %request.execution.id,
        step_id = %request.step.id,
        "executing step"
    );

    let client = start(config, plugin).await?;
    let result = match client.dispense(name) {
        Ok(stub) => stub.execute_task(request).await,
        Err(e) => {
            stop(config, client).await;
            return Err(e.into());
        }
    };
    stop(config, client).await;
    Ok(report("ExecuteTask", result))
}

pub async fn payload(
    config: &RunbridgeConfig,
    plugin: &str,
    name: &str,
    endpoint: String,
    body: Vec<u8>,
) -> Result<bool> {
    let request = PayloadHandlerRequest {
        config: config.service_config(),
        endpoint,
        body,
    };

    let client = start(config, plugin).await?;
    let result = match client.dispense(name) {
        Ok(stub) => stub.handle_payload(request).await,
        Err(e) => {
            stop(config, client).await;
            return Err(e.into());
        }
    };
    stop(config, client).await;
    Ok(report("HandlePayload", result))
}

/// Print the outcome of a call and say whether it succeeded.
fn report(call: &str, result: Result<Response, PluginError>) -> bool {
    match result {
        Ok(resp) if resp.success => {
            note_success(&format!("{call} succeeded"));
            true
        }
        Ok(_) => {
            note_error(&format!("{call} reported failure"));
            false
        }
        Err(PluginError::Capability(e)) => {
            note_error(&format!("{call} failed ({:?}): {}", e.kind, e.message));
            false
        }
        Err(e) => {
            note_error(&format!("{call} failed: {e}"));
            false
        }
    }
}
