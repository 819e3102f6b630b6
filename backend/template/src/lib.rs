//! The Template action plugin.
//!
//! `ExecuteTask` writes the execution id, step id and `Param1` into the
//! step's message log and reports the step as finished.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use runbridge_core::{
    ActionDescriptor, Capability, CapabilityDescriptor, CapabilityError, ExecuteTaskRequest,
    ParamDeclaration, PayloadEndpoints, PayloadHandlerRequest, PluginError, PluginKind, Response,
    StepStatus, StepUpdate,
};
use runbridge_executions::{HttpStepUpdater, StepUpdater};
use runbridge_logging::redact_sensitive_data;

pub const PARAM1: &str = "Param1";

/// Final line of every successful step log.
pub const FINISHED_MESSAGE: &str = "Template Action finished";

pub struct TemplatePlugin<U = HttpStepUpdater> {
    updater: U,
}

impl TemplatePlugin {
    pub fn new() -> Self {
        Self::with_updater(HttpStepUpdater::new())
    }
}

impl Default for TemplatePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: StepUpdater> TemplatePlugin<U> {
    pub fn with_updater(updater: U) -> Self {
        Self { updater }
    }
}

pub fn descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "Template".into(),
        kind: PluginKind::Action,
        version: "1.1.0".into(),
        author: "JustNZ".into(),
        action: ActionDescriptor {
            name: "Template".into(),
            description: "Template description".into(),
            plugin: "template".into(),
            icon: "solar:clipboard-list-broken".into(),
            category: "Template".into(),
            params: vec![ParamDeclaration {
                key: PARAM1.into(),
                kind: "text".into(),
                default: String::new(),
                required: false,
                description: "Param1 description".into(),
            }],
        },
        endpoints: PayloadEndpoints::default(),
    }
}

#[async_trait]
impl<U: StepUpdater + 'static> Capability for TemplatePlugin<U> {
    async fn info(&self) -> Result<CapabilityDescriptor, PluginError> {
        Ok(descriptor())
    }

    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<Response, PluginError> {
        let started_at = Utc::now();
        let param1 = request.step.action.param(PARAM1);

        let update = StepUpdate {
            id: request.step.id,
            messages: vec![
                format!("Execution ID: {}", request.execution.id),
                format!("Step ID: {}", request.step.id),
                param1.to_string(),
                FINISHED_MESSAGE.to_string(),
            ],
            status: StepStatus::Success,
            started_at,
            finished_at: Utc::now(),
        };

        debug!(
            execution_id = %request.execution.id,
            step_id = %request.step.id,
            "reporting template step"
        );
        match self
            .updater
            .update_step(&request.config, request.execution.id, &update)
            .await
        {
            Ok(()) => Ok(Response::ok()),
            Err(e) => {
                let message = e.to_string();
                warn!(
                    execution_id = %request.execution.id,
                    error = %redact_sensitive_data(&message),
                    "step update failed"
                );
                Err(CapabilityError::state_store(message).into())
            }
        }
    }

    async fn handle_payload(&self, _request: PayloadHandlerRequest) -> Result<Response, PluginError> {
        Err(CapabilityError::not_implemented().into())
    }
}

/// Factory registered under the default plugin name.
pub fn template_capability() -> Arc<dyn Capability> {
    Arc::new(TemplatePlugin::new())
}
