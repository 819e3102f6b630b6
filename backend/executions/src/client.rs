//! Execution-state store HTTP client. Reports step progress back to the backend.
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use runbridge_core::{ServiceConfig, StepUpdate};

/// Longest response body excerpt kept in an error.
const BODY_PREVIEW_LIMIT: usize = 256;

#[derive(Debug, Error)]
pub enum StepUpdateError {
    #[error("invalid service config: {0}")]
    InvalidConfig(String),

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("state store returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
}

/// Idempotent update of one step, keyed by execution and step id.
#[async_trait]
pub trait StepUpdater: Send + Sync {
    async fn update_step(
        &self,
        config: &ServiceConfig,
        execution_id: Uuid,
        step: &StepUpdate,
    ) -> Result<(), StepUpdateError>;
}

/// `PUT {url}/api/v1/executions/{execution_id}/steps/{step_id}`.
#[derive(Clone, Default)]
pub struct HttpStepUpdater {
    http: Client,
}

impl HttpStepUpdater {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

pub fn step_url(config: &ServiceConfig, execution_id: Uuid, step_id: Uuid) -> String {
    format!(
        "{}/api/v1/executions/{}/steps/{}",
        config.url.trim_end_matches('/'),
        execution_id,
        step_id
    )
}

#[async_trait]
impl StepUpdater for HttpStepUpdater {
    async fn update_step(
        &self,
        config: &ServiceConfig,
        execution_id: Uuid,
        step: &StepUpdate,
    ) -> Result<(), StepUpdateError> {
        if config.url.trim().is_empty() {
            return Err(StepUpdateError::InvalidConfig("url is empty".into()));
        }
        let url = step_url(config, execution_id, step.id);
        debug!(url = %url, status = %step.status, "updating step");

        let res = self
            .http
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, &config.api_key)
            .timeout(config.request_timeout())
            .json(step)
            .send()
            .await
            .map_err(|e| StepUpdateError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        warn!(url = %url, status = status.as_u16(), "step update rejected");
        Err(StepUpdateError::Status {
            status: status.as_u16(),
            url,
            body: preview_body(&body),
        })
    }
}

fn preview_body(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    match body.char_indices().nth(BODY_PREVIEW_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
