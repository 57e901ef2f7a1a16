//! One running external-plugin process: its child handle, protocol
//! transport, and the state machine from §4.5.
//!
//! Grounded on the spawn shape used for out-of-process plugins elsewhere in
//! the ecosystem (piped stdin/stdout, a dedicated reader loop, stderr
//! forwarded to the host log) but expressed with `tokio::process` instead
//! of a thread-per-plugin model, so every session's I/O is a suspension
//! point rather than a blocking call.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::context::Shutdown;
use crate::error::{ReginaldError, Result};
use crate::rpc::protocol::{HandshakeReply, HandshakeRequest, PROTOCOL, PROTOCOL_VERSION};
use crate::rpc::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Starting,
    Ready,
    ShuttingDown,
    Exited,
    Failed,
}

/// The live state of one external plugin process.
pub struct PluginSession {
    plugin_name: String,
    state: SessionState,
    child: Option<Child>,
    transport: Option<Transport>,
    stderr_handle: Option<JoinHandle<()>>,
}

impl PluginSession {
    pub fn new(plugin_name: String) -> Self {
        Self {
            plugin_name,
            state: SessionState::Unstarted,
            child: None,
            transport: None,
            stderr_handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Spawn the plugin process, wire up its streams, and perform the
    /// handshake. On any failure the session is left `Failed` and the
    /// child, if spawned, is reaped.
    pub async fn start(&mut self, executable: &str, expected_name: &str) -> Result<()> {
        self.state = SessionState::Starting;

        let mut child = Command::new(executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                self.state = SessionState::Failed;
                ReginaldError::StartFailed {
                    plugin: self.plugin_name.clone(),
                    reason: e.to_string(),
                }
            })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let plugin_name = self.plugin_name.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => warn!(plugin = %plugin_name, "{line}"),
                    _ => break,
                }
            }
        });

        let transport = Transport::spawn(self.plugin_name.clone(), stdout, stdin);

        let handshake_result = self
            .do_handshake(&transport, expected_name)
            .await;

        match handshake_result {
            Ok(()) => {
                self.child = Some(child);
                self.transport = Some(transport);
                self.stderr_handle = Some(stderr_handle);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_handle.abort();
                Err(e)
            }
        }
    }

    async fn do_handshake(&self, transport: &Transport, expected_name: &str) -> Result<()> {
        let request = serde_json::to_value(HandshakeRequest::default())?;
        let reply_value = transport
            .call("handshake", request, std::future::pending::<()>())
            .await?;
        let reply: HandshakeReply = serde_json::from_value(reply_value)?;

        if reply.protocol != PROTOCOL {
            return Err(ReginaldError::HandshakeMismatch {
                field: "protocol",
                want: PROTOCOL.to_string(),
                got: reply.protocol,
            });
        }
        if reply.protocol_version != PROTOCOL_VERSION {
            return Err(ReginaldError::HandshakeMismatch {
                field: "protocolVersion",
                want: PROTOCOL_VERSION.to_string(),
                got: reply.protocol_version,
            });
        }
        if reply.name != expected_name {
            return Err(ReginaldError::HandshakeMismatch {
                field: "name",
                want: expected_name.to_string(),
                got: reply.name,
            });
        }
        Ok(())
    }

    /// Dispatch `runCommand` for the dotted sub-path `cmd`.
    pub async fn run_command(
        &self,
        cmd: &str,
        config: Value,
        plugin_config: Value,
        shutdown: &Shutdown,
    ) -> Result<()> {
        let transport = self.require_transport()?;
        let params = serde_json::json!({ "cmd": cmd, "config": config, "pluginConfig": plugin_config });
        transport
            .call("runCommand", params, shutdown.cancelled())
            .await?;
        Ok(())
    }

    /// `shutdown` then `exit`, waiting for the process to exit or for
    /// `shutdown` to fire first. Returns an error without killing the
    /// process; the caller decides whether to escalate to `kill`.
    pub async fn graceful_shutdown(&mut self, shutdown: &Shutdown) -> Result<()> {
        self.state = SessionState::ShuttingDown;
        let transport = self.require_transport()?;

        // Any failure to get a `true` ack back — including the shutdown
        // signal winning the race against an unresponsive plugin — is
        // reported uniformly as this session having halted, matching the
        // wording callers key diagnostics off (§7, §8 Scenario F).
        let result = transport
            .call("shutdown", Value::Null, shutdown.cancelled())
            .await
            .map_err(|_| ReginaldError::ShutdownHalted(self.plugin_name.clone()))?;
        if result != Value::Bool(true) {
            return Err(ReginaldError::ShutdownHalted(self.plugin_name.clone()));
        }
        transport.notify("exit", Value::Null).await?;

        let child = self
            .child
            .as_mut()
            .ok_or_else(|| ReginaldError::ShutdownHalted(self.plugin_name.clone()))?;

        tokio::select! {
            status = child.wait() => {
                status.map_err(|e| ReginaldError::ShutdownHalted(format!("{}: {e}", self.plugin_name)))?;
                self.state = SessionState::Exited;
                Ok(())
            }
            _ = shutdown.cancelled() => {
                Err(ReginaldError::ShutdownHalted(self.plugin_name.clone()))
            }
        }
    }

    /// Forcefully terminate the process. Used when graceful shutdown does
    /// not complete before the host's deadline.
    pub async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(handle) = self.stderr_handle.take() {
            handle.abort();
        }
        self.state = SessionState::Failed;
    }

    fn require_transport(&self) -> Result<&Transport> {
        self.transport
            .as_ref()
            .ok_or_else(|| ReginaldError::RpcTransport(format!("{} has no active session", self.plugin_name)))
    }
}
