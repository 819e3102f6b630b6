//! Plugin side: the server adapter wrapping concrete capability implementations.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use runbridge_core::{Capability, PluginError, Response, TransportError};

use crate::codec::{encode_frame, write_encoded, FrameReader, DEFAULT_MAX_LINE};
use crate::message::{peek_id, Method, RpcError, RpcRequest, RpcResponse};

/// Responses waiting for the writer task.
const OUTBOUND_QUEUE: usize = 64;

/// Dispatches decoded requests into the wrapped implementations.
///
/// The adapter is a pure pass-through: it decodes the params, calls the
/// implementation and writes both the result and the error into the response,
/// leaving the error untouched.
pub struct RpcServer {
    plugins: HashMap<String, Arc<dyn Capability>>,
    max_frame: usize,
}

impl RpcServer {
    pub fn new(plugins: HashMap<String, Arc<dyn Capability>>) -> Self {
        Self {
            plugins,
            max_frame: DEFAULT_MAX_LINE,
        }
    }

    /// Limit for request and response lines. Defaults to `DEFAULT_MAX_LINE`.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Server exposing a single implementation under `name`.
    pub fn single(name: impl Into<String>, plugin: Arc<dyn Capability>) -> Self {
        let mut plugins = HashMap::new();
        plugins.insert(name.into(), plugin);
        Self::new(plugins)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Handle one request.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            id,
            plugin,
            method,
            params,
        } = request;

        let Some(imp) = self.plugins.get(&plugin) else {
            warn!(plugin = %plugin, method = %method, "call for unknown plugin");
            return RpcResponse::failure(
                id,
                Value::Null,
                RpcError::Transport(TransportError::UnknownPlugin(plugin).to_string()),
            );
        };

        debug!(id, plugin = %plugin, method = %method, "dispatching call");
        match method {
            Method::Info => finish(id, imp.info().await, Value::Null),
            Method::ExecuteTask => match decode_params(id, params) {
                Ok(req) => finish(id, imp.execute_task(req).await, failed_slot()),
                Err(resp) => resp,
            },
            Method::HandlePayload => match decode_params(id, params) {
                Ok(req) => finish(id, imp.handle_payload(req).await, failed_slot()),
                Err(resp) => resp,
            },
        }
    }

    /// Serve requests until the reader reaches EOF.
    ///
    /// An oversized request is answered with an error when its id can be
    /// read; otherwise it ends the channel with `FrameTooLarge`.
    ///
    /// Each request runs on its own task; responses are written by a single
    /// writer task in completion order. In-flight calls finish before this
    /// returns.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<RpcResponse>(OUTBOUND_QUEUE);
        let max_frame = self.max_frame;

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(resp) = rx.recv().await {
                let frame = match encode_frame(&resp, max_frame) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(id = resp.id, error = %e, "response does not fit in a frame");
                        let failure = RpcResponse::failure(
                            resp.id,
                            Value::Null,
                            RpcError::Transport(e.to_string()),
                        );
                        encode_frame(&failure, max_frame)?
                    }
                };
                write_encoded(&mut writer, &frame).await?;
            }
            Ok::<(), TransportError>(())
        });

        let mut frames = FrameReader::with_max_line(reader, max_frame);
        let read_result = loop {
            let line = match frames.next_frame().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(TransportError::Decode(msg)) => {
                    warn!(error = %msg, "dropping undecodable frame");
                    continue;
                }
                Err(e @ TransportError::FrameTooLarge { id: Some(id), .. }) => {
                    warn!(id, error = %e, "oversized request");
                    let resp =
                        RpcResponse::failure(id, Value::Null, RpcError::Transport(e.to_string()));
                    if tx.send(resp).await.is_err() {
                        break Err(TransportError::ChannelClosed);
                    }
                    continue;
                }
                Err(e) => break Err(e),
            };

            let request = match serde_json::from_str::<RpcRequest>(&line) {
                Ok(r) => r,
                Err(e) => {
                    match peek_id(&line) {
                        Some(id) => {
                            let resp = RpcResponse::failure(
                                id,
                                Value::Null,
                                RpcError::Transport(
                                    TransportError::Decode(e.to_string()).to_string(),
                                ),
                            );
                            if tx.send(resp).await.is_err() {
                                break Err(TransportError::ChannelClosed);
                            }
                        }
                        None => warn!(error = %e, "dropping malformed request"),
                    }
                    continue;
                }
            };

            let server = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let resp = server.dispatch(request).await;
                if tx.send(resp).await.is_err() {
                    debug!("response dropped, writer is gone");
                }
            });
        };

        drop(tx);
        let write_result = match writer_task.await {
            Ok(r) => r,
            Err(e) => Err(TransportError::Io(e.to_string())),
        };
        info!("rpc channel closed");
        read_result.and(write_result)
    }
}

fn failed_slot() -> Value {
    serde_json::to_value(Response::failed()).unwrap_or(Value::Null)
}

fn decode_params<T: DeserializeOwned>(id: u64, params: Value) -> Result<T, RpcResponse> {
    serde_json::from_value(params).map_err(|e| {
        RpcResponse::failure(
            id,
            Value::Null,
            RpcError::Transport(TransportError::Decode(e.to_string()).to_string()),
        )
    })
}

/// Write the call outcome into a response. On error `slot` stands in for the result.
fn finish<T: Serialize>(id: u64, outcome: Result<T, PluginError>, slot: Value) -> RpcResponse {
    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => RpcResponse::failure(
                id,
                Value::Null,
                RpcError::Transport(TransportError::Encode(e.to_string()).to_string()),
            ),
        },
        Err(PluginError::Capability(e)) => {
            RpcResponse::failure(id, slot, RpcError::Capability(e))
        }
        Err(other) => RpcResponse::failure(id, slot, RpcError::Transport(other.to_string())),
    }
}
