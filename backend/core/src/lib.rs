pub mod error;
pub mod handshake;
pub mod traits;
pub mod types;

pub use error::{
    CapabilityError, CapabilityErrorKind, HandshakeError, PluginError, TransportError,
};
pub use handshake::{
    HandshakeConfig, HandshakeLine, ProtocolEvent, ProtocolState, CORE_PROTOCOL_VERSION,
    PROTOCOL_VERSIONS_ENV,
};
pub use traits::Capability;
pub use types::{
    ActionDescriptor, ActionParam, CapabilityDescriptor, ExecuteTaskRequest, Execution,
    ExecutionStep, ParamDeclaration, PayloadEndpoint, PayloadEndpoints, PayloadHandlerRequest,
    PluginKind, Response, ServiceConfig, StepAction, StepStatus, StepUpdate,
};
