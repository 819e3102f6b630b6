//! Plugin process launcher and the host's handle on a running plugin.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use runbridge_core::handshake::format_version_list;
use runbridge_core::{
    HandshakeConfig, HandshakeError, HandshakeLine, ProtocolEvent, ProtocolState,
    TransportError, PROTOCOL_VERSIONS_ENV,
};
use runbridge_rpc::{FrameReader, RpcCapability, RpcClient};

use crate::error::SupervisorError;

/// How long a freshly spawned plugin gets to print its handshake line.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait between closing stdin and killing the plugin.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Host-wide launch settings shared by every plugin process.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub handshake: HandshakeConfig,
    /// Application protocol versions offered via `PLUGIN_PROTOCOL_VERSIONS`.
    pub supported_versions: Vec<u32>,
    /// Names the host may dispense from a plugin process.
    pub names: Vec<String>,
    pub call_timeout: Option<Duration>,
    pub handshake_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        let handshake = HandshakeConfig::default();
        Self {
            supported_versions: vec![handshake.protocol_version],
            handshake,
            names: vec!["plugin".to_string()],
            call_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Spawn `path` with `args` and complete the handshake.
///
/// The child is spawned with `kill_on_drop`, so dropping the returned client
/// without calling [`PluginClient::shutdown`] still reaps the process.
pub async fn launch(
    path: &Path,
    args: &[String],
    options: &HostOptions,
) -> Result<PluginClient, SupervisorError> {
    let mut state = ProtocolState::Unstarted;

    let mut child = Command::new(path)
        .args(args)
        .env(
            &options.handshake.magic_cookie_key,
            &options.handshake.magic_cookie_value,
        )
        .env(
            PROTOCOL_VERSIONS_ENV,
            format_version_list(&options.supported_versions),
        )
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
    state = advance(state, ProtocolEvent::Spawned, path)?;

    let label = plugin_label(path);
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(forward_stderr(label.clone(), stderr)));
    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(TransportError::Io("plugin stdio was not captured".into()).into());
    };

    let mut frames = FrameReader::new(stdout);
    let version = match read_handshake(&mut frames, options).await {
        Ok(version) => version,
        Err(source) => {
            let _ = advance(state, ProtocolEvent::HandshakeFailed, path);
            let _ = child.kill().await;
            warn!(plugin = %label, error = %source, "plugin handshake failed");
            return Err(SupervisorError::Handshake {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    state = advance(state, ProtocolEvent::HandshakeSucceeded, path)?;
    info!(plugin = %label, version, pid = ?child.id(), "plugin ready");

    let rpc = RpcClient::from_frames(frames, stdin).with_call_timeout(options.call_timeout);
    Ok(PluginClient {
        path: path.to_path_buf(),
        label,
        version,
        names: options.names.clone(),
        rpc: Arc::new(rpc),
        state: Mutex::new(state),
        child: AsyncMutex::new(Some(child)),
        stderr_task,
    })
}

async fn read_handshake(
    frames: &mut FrameReader<tokio::process::ChildStdout>,
    options: &HostOptions,
) -> Result<u32, HandshakeError> {
    let line = match tokio::time::timeout(options.handshake_timeout, frames.next_frame()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Err(HandshakeError::PluginExited),
        Ok(Err(e)) => return Err(HandshakeError::Malformed(e.to_string())),
        Err(_) => {
            return Err(HandshakeError::Malformed(format!(
                "no handshake within {:?}",
                options.handshake_timeout
            )))
        }
    };
    line.parse::<HandshakeLine>()?
        .check(&options.supported_versions)
}

fn advance(
    state: ProtocolState,
    event: ProtocolEvent,
    path: &Path,
) -> Result<ProtocolState, SupervisorError> {
    state.next(event).map_err(|source| SupervisorError::Handshake {
        path: path.to_path_buf(),
        source,
    })
}

async fn forward_stderr(label: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(plugin = %label, "{line}");
    }
}

fn plugin_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A running plugin process after a successful handshake.
pub struct PluginClient {
    path: PathBuf,
    label: String,
    version: u32,
    names: Vec<String>,
    rpc: Arc<RpcClient>,
    state: Mutex<ProtocolState>,
    child: AsyncMutex<Option<Child>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl PluginClient {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Executable file stem, used as the plugin's id in logs and the manager.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Application protocol version agreed during the handshake.
    pub fn negotiated_version(&self) -> u32 {
        self.version
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn state(&self) -> ProtocolState {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if self.rpc.is_closed() && *state != ProtocolState::Terminated {
            *state = state
                .next(ProtocolEvent::Disconnected)
                .unwrap_or(ProtocolState::Terminated);
        }
        *state
    }

    /// Stub for the plugin registered under `name` in this process.
    pub fn dispense(&self, name: &str) -> Result<RpcCapability, SupervisorError> {
        if !self.state().accepts_calls() {
            return Err(TransportError::ChannelClosed.into());
        }
        if !self.names.iter().any(|n| n == name) {
            return Err(TransportError::UnknownPlugin(name.to_string()).into());
        }
        Ok(RpcCapability::new(Arc::clone(&self.rpc), name))
    }

    /// Close stdin, wait up to `grace` for exit, then kill.
    ///
    /// Returns the exit status, or `None` if the process was already reaped.
    pub async fn shutdown(&self, grace: Duration) -> Result<Option<ExitStatus>, SupervisorError> {
        self.rpc.shutdown().await;
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            *state = ProtocolState::Terminated;
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(None);
        };
        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(plugin = %self.label, ?grace, "plugin did not exit in time; killing");
                let _ = child.kill().await;
                child.wait().await
            }
        }
        .map_err(|e| TransportError::Io(e.to_string()))?;

        if let Some(task) = &self.stderr_task {
            task.abort();
        }
        debug!(plugin = %self.label, %status, "plugin exited");
        Ok(Some(status))
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        if let Some(task) = &self.stderr_task {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use runbridge_core::Capability;

    const SH: &str = "/bin/sh";

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    fn options() -> HostOptions {
        HostOptions {
            handshake_timeout: Duration::from_secs(5),
            ..HostOptions::default()
        }
    }

    #[tokio::test]
    async fn test_handshake_and_graceful_shutdown() {
        let client = launch(
            Path::new(SH),
            &script(
                r#"[ "$PLUGIN_MAGIC_COOKIE" = hello ] || exit 1
                   [ "$PLUGIN_PROTOCOL_VERSIONS" = 1 ] || exit 1
                   echo '1|1|stdio|-|jsonrpc'
                   cat > /dev/null"#,
            ),
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(client.state(), ProtocolState::Ready);
        assert_eq!(client.negotiated_version(), 1);

        let status = client.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(status.unwrap().success());
        assert_eq!(client.state(), ProtocolState::Terminated);
        assert!(client.shutdown(Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispense_checks_names_and_state() {
        let client = launch(
            Path::new(SH),
            &script("echo '1|1|stdio|-|jsonrpc'; cat > /dev/null"),
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(client.dispense("plugin").unwrap().plugin_name(), "plugin");
        assert!(matches!(
            client.dispense("other"),
            Err(SupervisorError::Transport(TransportError::UnknownPlugin(_)))
        ));

        client.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            client.dispense("plugin"),
            Err(SupervisorError::Transport(TransportError::ChannelClosed))
        ));
    }

    #[tokio::test]
    async fn test_stubborn_plugin_is_killed_after_grace() {
        let client = launch(
            Path::new(SH),
            &script("echo '1|1|stdio|-|jsonrpc'; exec sleep 30"),
            &options(),
        )
        .await
        .unwrap();

        let status = client
            .shutdown(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_exit_before_handshake() {
        let err = launch(Path::new(SH), &script("exit 1"), &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SupervisorError::Handshake {
                source: HandshakeError::PluginExited,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unsupported_version_is_rejected() {
        let err = launch(
            Path::new(SH),
            &script("echo '1|7|stdio|-|jsonrpc'; cat > /dev/null"),
            &options(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SupervisorError::Handshake {
                source: HandshakeError::UnsupportedVersion { got: 7, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_garbage_handshake_is_malformed() {
        let err = launch(
            Path::new(SH),
            &script("echo 'hello there'; cat > /dev/null"),
            &options(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SupervisorError::Handshake {
                source: HandshakeError::Malformed(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let err = launch(Path::new("/nonexistent/plugin"), &[], &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_plugin_death_fails_calls() {
        let client = launch(
            Path::new(SH),
            &script("echo '1|1|stdio|-|jsonrpc'; read line; exit 0"),
            &options(),
        )
        .await
        .unwrap();

        let stub = client.dispense("plugin").unwrap();
        let err = stub.info().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(client.state(), ProtocolState::Terminated);
    }
}
