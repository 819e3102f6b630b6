use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PluginError;
use crate::types::{CapabilityDescriptor, ExecuteTaskRequest, PayloadHandlerRequest, Response};

/// The contract every plugin satisfies.
///
/// Two kinds of implementors exist: the concrete plugin living inside the
/// plugin process, and the RPC-forwarding stub the host holds. An `Err`
/// always implies `success: false`; `Ok(Response { success: false })` means
/// the call went through and the plugin chose to report failure.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Static identity and parameter metadata. Must be deterministic.
    async fn info(&self) -> Result<CapabilityDescriptor, PluginError>;

    /// Run one scheduled step.
    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<Response, PluginError>;

    /// Handle an inbound payload for one of the declared endpoints.
    async fn handle_payload(&self, request: PayloadHandlerRequest)
        -> Result<Response, PluginError>;
}

#[async_trait]
impl<T: Capability + ?Sized> Capability for Arc<T> {
    async fn info(&self) -> Result<CapabilityDescriptor, PluginError> {
        (**self).info().await
    }

    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<Response, PluginError> {
        (**self).execute_task(request).await
    }

    async fn handle_payload(
        &self,
        request: PayloadHandlerRequest,
    ) -> Result<Response, PluginError> {
        (**self).handle_payload(request).await
    }
}
