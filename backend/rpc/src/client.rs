//! Host side: the RPC client and the capability stub built on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use runbridge_core::{
    Capability, CapabilityDescriptor, ExecuteTaskRequest, PayloadHandlerRequest, PluginError,
    Response, TransportError,
};

use crate::codec::{encode_frame, write_encoded, FrameReader};
use crate::message::{peek_id, Method, RpcError, RpcRequest, RpcResponse};

type Pending = Arc<Mutex<PendingCalls>>;

#[derive(Default)]
struct PendingCalls {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<RpcResponse>>,
}

impl PendingCalls {
    /// Mark the channel dead. Dropping the senders fails every waiter.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

/// Removes a call's waiter however `call` exits, including when its future is dropped.
struct WaiterGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiters.remove(&self.id);
    }
}

/// Multiplexes concurrent calls over one channel, matching responses by id.
pub struct RpcClient {
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    call_timeout: Option<Duration>,
    max_frame: usize,
    reader_task: JoinHandle<()>,
}

impl RpcClient {
    /// Start a client over a raw reader/writer pair.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::from_frames(FrameReader::new(reader), writer)
    }

    /// Start a client over a reader that may already have consumed the handshake line.
    pub fn from_frames<R, W>(frames: FrameReader<R>, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let max_frame = frames.max_line();
        let pending: Pending = Arc::new(Mutex::new(PendingCalls::default()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader_task = tokio::spawn(read_loop(frames, Arc::clone(&pending), Arc::clone(&closed)));
        Self {
            writer: AsyncMutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            call_timeout: None,
            max_frame,
            reader_task,
        }
    }

    /// Fail calls that get no answer within `timeout`. The channel stays usable.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sever the channel. In-flight and later calls fail with `ChannelClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.pending).close();
        self.reader_task.abort();
    }

    /// Close the channel and drop the underlying writer so the peer reads EOF.
    pub async fn shutdown(&self) {
        self.close();
        let mut writer = self.writer.lock().await;
        let _ = writer.flush().await;
        *writer = Box::new(tokio::io::sink());
    }

    /// Perform one call and decode its result.
    ///
    /// A request that would not fit in one frame on the peer's side fails
    /// with `Encode` before anything is written.
    pub async fn call<P, T>(&self, plugin: &str, method: Method, params: &P) -> Result<T, PluginError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|e| TransportError::Encode(e.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            plugin: plugin.to_string(),
            method,
            params,
        };
        let frame = encode_frame(&request, self.max_frame)?;

        let rx = {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(TransportError::ChannelClosed.into());
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.insert(id, tx);
            rx
        };
        let _guard = WaiterGuard {
            pending: &self.pending,
            id,
        };

        debug!(id, plugin, method = %method, bytes = frame.len(), "sending call");
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_encoded(&mut *writer, &frame).await {
                if e.is_fatal() {
                    self.close();
                }
                return Err(e.into());
            }
        }

        let response = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(r) => r,
                Err(_) => return Err(TransportError::Timeout(limit).into()),
            },
            None => rx.await,
        }
        .map_err(|_| TransportError::ChannelClosed)?;

        match response.error {
            Some(RpcError::Capability(e)) => Err(PluginError::Capability(e)),
            Some(RpcError::Transport(msg)) => Err(TransportError::Remote(msg).into()),
            None => serde_json::from_value(response.result)
                .map_err(|e| TransportError::Decode(e.to_string()).into()),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_loop<R>(mut frames: FrameReader<R>, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let line = match frames.next_frame().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(TransportError::Decode(msg)) => {
                warn!(error = %msg, "dropping undecodable frame");
                continue;
            }
            Err(e @ TransportError::FrameTooLarge { id: Some(id), .. }) => {
                warn!(id, error = %e, "oversized response");
                fail_waiter(&pending, id, e);
                continue;
            }
            Err(e) => {
                warn!(error = %e, "rpc channel failed");
                break;
            }
        };

        let response = match serde_json::from_str::<RpcResponse>(&line) {
            Ok(r) => r,
            Err(e) => match peek_id(&line) {
                Some(id) => {
                    fail_waiter(&pending, id, TransportError::Decode(e.to_string()));
                    continue;
                }
                None => {
                    warn!(error = %e, "dropping malformed response");
                    continue;
                }
            },
        };

        deliver(&pending, response);
    }

    closed.store(true, Ordering::SeqCst);
    lock(&pending).close();
    debug!("rpc reader finished");
}

fn deliver(pending: &Pending, response: RpcResponse) {
    let waiter = lock(pending).waiters.remove(&response.id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => debug!(id = response.id, "response for unknown or abandoned call"),
    }
}

fn fail_waiter(pending: &Pending, id: u64, error: TransportError) {
    deliver(
        pending,
        RpcResponse::failure(id, Value::Null, RpcError::Transport(error.to_string())),
    );
}

/// The host's view of one named plugin: every call crosses the channel.
#[derive(Clone)]
pub struct RpcCapability {
    client: Arc<RpcClient>,
    plugin: String,
}

impl RpcCapability {
    pub fn new(client: Arc<RpcClient>, plugin: impl Into<String>) -> Self {
        Self {
            client,
            plugin: plugin.into(),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }
}

#[async_trait]
impl Capability for RpcCapability {
    async fn info(&self) -> Result<CapabilityDescriptor, PluginError> {
        self.client.call(&self.plugin, Method::Info, &Value::Null).await
    }

    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<Response, PluginError> {
        self.client
            .call(&self.plugin, Method::ExecuteTask, &request)
            .await
    }

    async fn handle_payload(
        &self,
        request: PayloadHandlerRequest,
    ) -> Result<Response, PluginError> {
        self.client
            .call(&self.plugin, Method::HandlePayload, &request)
            .await
    }
}
