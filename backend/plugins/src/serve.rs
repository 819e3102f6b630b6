//! Plugin entry point: validate the handshake, announce it, then serve calls
//! until the host hangs up.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use runbridge_core::{
    HandshakeConfig, HandshakeError, PluginError, ProtocolEvent, ProtocolState, TransportError,
    PROTOCOL_VERSIONS_ENV,
};
use runbridge_rpc::RpcServer;

use crate::registry::PluginSet;

/// Printed when the binary is started by hand instead of by a host.
pub const DIRECT_INVOCATION_NOTICE: &str = "This binary is a plugin. These are not meant to be \
executed directly. Please execute the program that consumes these plugins, which will load \
any plugins automatically";

/// Everything a plugin process needs to serve.
pub struct ServeConfig {
    pub handshake: HandshakeConfig,
    pub plugins: PluginSet,
}

impl ServeConfig {
    pub fn new(handshake: HandshakeConfig, plugins: PluginSet) -> Self {
        Self { handshake, plugins }
    }
}

/// Serve over stdin/stdout with the process environment, stopping on ctrl-c.
pub async fn serve(config: ServeConfig) -> Result<(), PluginError> {
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    serve_with(
        config,
        |key| std::env::var(key).ok(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}

/// Serve on arbitrary streams. `env` stands in for the process environment.
///
/// Nothing is written to `writer` unless the plugin set is non-empty and the
/// cookie and version checks pass.
pub async fn serve_with<E, R, W, S>(
    config: ServeConfig,
    env: E,
    reader: R,
    mut writer: W,
    shutdown: S,
) -> Result<(), PluginError>
where
    E: Fn(&str) -> Option<String>,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let ServeConfig { handshake, plugins } = config;
    if plugins.is_empty() {
        return Err(PluginError::NoPlugins);
    }
    let mut state = ProtocolState::Unstarted.next(ProtocolEvent::Spawned)?;

    let negotiated = handshake.validate_cookie(&env).and_then(|()| {
        handshake.negotiate_version(env(PROTOCOL_VERSIONS_ENV).as_deref())
    });
    let version = match negotiated {
        Ok(v) => v,
        Err(e) => {
            state = state.next(ProtocolEvent::HandshakeFailed)?;
            error!(state = %state, error = %e, "handshake failed");
            return Err(e.into());
        }
    };

    info!(plugins = ?plugins.names(), version, "serving plugins");
    let server = Arc::new(RpcServer::new(plugins.instantiate()));

    let line = format!("{}\n", handshake.handshake_line(version));
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    state = state.next(ProtocolEvent::HandshakeSucceeded)?;
    info!(state = %state, "handshake complete");

    let result = tokio::select! {
        r = server.serve(reader, writer) => r.map_err(PluginError::from),
        _ = shutdown => {
            info!("shutdown requested");
            Ok(())
        }
    };

    state = state.next(ProtocolEvent::Disconnected)?;
    info!(state = %state, "plugin stopped");
    result
}

/// Blocking-style entry for `main`: serve and map the outcome to an exit code.
pub async fn run(config: ServeConfig) -> ExitCode {
    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(PluginError::Handshake(
            HandshakeError::CookieMissing { .. } | HandshakeError::CookieMismatch { .. },
        )) => {
            eprintln!("{DIRECT_INVOCATION_NOTICE}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("plugin error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    use runbridge_core::{
        Capability, CapabilityDescriptor, CapabilityError, ExecuteTaskRequest,
        PayloadHandlerRequest, Response,
    };
    use runbridge_rpc::{FrameReader, RpcCapability, RpcClient};

    use super::*;

    struct Nothing;

    #[async_trait]
    impl Capability for Nothing {
        async fn info(&self) -> Result<CapabilityDescriptor, PluginError> {
            Err(CapabilityError::internal("no metadata").into())
        }

        async fn execute_task(&self, _: ExecuteTaskRequest) -> Result<Response, PluginError> {
            Ok(Response::ok())
        }

        async fn handle_payload(&self, _: PayloadHandlerRequest) -> Result<Response, PluginError> {
            Err(CapabilityError::not_implemented().into())
        }
    }

    fn config() -> ServeConfig {
        ServeConfig::new(
            HandshakeConfig::default(),
            PluginSet::single(|| Arc::new(Nothing)),
        )
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[tokio::test]
    async fn test_missing_cookie_fails_before_writing_anything() {
        let (host, plugin) = tokio::io::duplex(1024);
        let (pr, pw) = tokio::io::split(plugin);
        let err = serve_with(config(), env(&[]), pr, pw, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Handshake(HandshakeError::CookieMissing { .. })
        ));

        let mut out = Vec::new();
        let (mut hr, _hw) = tokio::io::split(host);
        hr.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_host_versions_fail_handshake() {
        let (_host, plugin) = tokio::io::duplex(1024);
        let (pr, pw) = tokio::io::split(plugin);
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "hello"), (PROTOCOL_VERSIONS_ENV, "2,3")]);
        let err = serve_with(config(), vars, pr, pw, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Handshake(HandshakeError::NoCommonVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_serves_after_handshake_until_host_disconnects() {
        let (host, plugin) = tokio::io::duplex(64 * 1024);
        let (pr, pw) = tokio::io::split(plugin);
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "hello"), (PROTOCOL_VERSIONS_ENV, "1")]);
        let served = tokio::spawn(serve_with(config(), vars, pr, pw, std::future::pending()));

        let (hr, hw) = tokio::io::split(host);
        let mut frames = FrameReader::new(hr);
        let line = frames.next_frame().await.unwrap().unwrap();
        assert_eq!(line, "1|1|stdio|-|jsonrpc");

        let client = Arc::new(RpcClient::from_frames(frames, hw));
        let stub = RpcCapability::new(client.clone(), "plugin");
        let err = stub.info().await.unwrap_err();
        assert_eq!(err.as_capability().map(|e| e.message.as_str()), Some("no metadata"));

        client.close();
        drop(stub);
        drop(client);
        assert!(served.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_serving() {
        let (_host, plugin) = tokio::io::duplex(1024);
        let (pr, pw) = tokio::io::split(plugin);
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "hello")]);
        let result = serve_with(config(), vars, pr, pw, async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_empty_plugin_set_is_rejected() {
        let (_host, plugin) = tokio::io::duplex(1024);
        let (pr, pw) = tokio::io::split(plugin);
        let vars = env(&[("PLUGIN_MAGIC_COOKIE", "hello")]);
        let cfg = ServeConfig::new(HandshakeConfig::default(), PluginSet::new());
        let err = serve_with(cfg, vars, pr, pw, std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(err, PluginError::NoPlugins);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("no plugins"));
    }
}
