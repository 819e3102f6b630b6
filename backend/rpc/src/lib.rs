//! Request/response bridge between a host and the plugins inside one process.
//!
//! [`RpcServer`] wraps local [`Capability`](runbridge_core::Capability)
//! implementations on the plugin side; [`RpcCapability`] is the host-side stub
//! implementing the same contract by forwarding every call over the channel.

pub mod client;
pub mod codec;
pub mod message;
pub mod server;

pub use client::{RpcCapability, RpcClient};
pub use codec::{encode_frame, write_frame, FrameReader, DEFAULT_MAX_LINE};
pub use message::{Method, RpcError, RpcRequest, RpcResponse};
pub use server::RpcServer;
