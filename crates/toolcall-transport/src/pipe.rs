//! Child-process transport: newline-delimited JSON over stdin/stdout.

use std::{collections::HashMap, path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{ChildStderr, ChildStdin, ChildStdout, Command},
    sync::Mutex,
    task::JoinHandle,
};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use toolcall_core::{ChannelError, ConnectionError, Transport};

use crate::{command::CommandBuilder, peer::RpcPeer, protocol::OutgoingMessage};

/// Pipe transport configuration.
#[derive(Debug, Clone)]
pub struct PipeTransportConfig {
    /// Server launch command.
    pub command: CommandBuilder,
    /// Extra environment for the server process.
    pub env: HashMap<String, String>,
    /// Working directory for the server process.
    pub working_dir: Option<PathBuf>,
    /// How long the server gets to exit after stdin closes before it is killed.
    pub shutdown_grace: Duration,
}

impl PipeTransportConfig {
    /// Configuration for the given launch command.
    #[must_use]
    pub fn new(command: CommandBuilder) -> Self {
        Self {
            command,
            env: HashMap::new(),
            working_dir: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Serialized writes to the child's stdin.
#[derive(Clone)]
struct LineWriter {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl LineWriter {
    fn new(stdin: ChildStdin) -> Self {
        Self {
            stdin: Arc::new(Mutex::new(Some(stdin))),
        }
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), ChannelError> {
        let mut line = message.to_line()?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ChannelError::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Drop stdin so the server sees end of input.
    async fn shut(&self) {
        self.stdin.lock().await.take();
    }
}

async fn read_loop(stdout: ChildStdout, peer: Arc<RpcPeer>, writer: LineWriter) {
    let mut lines = LinesStream::new(BufReader::new(stdout).lines());
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(reply) = peer.handle_line(line) {
                    if let Err(e) = writer.send(&reply).await {
                        tracing::warn!("Failed to answer server request: {e}");
                    }
                }
            }
            Err(e) => {
                tracing::error!("Error reading server stdout: {e}");
                break;
            }
        }
    }
    peer.fail_all();
    tracing::debug!("Server stdout closed");
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = LinesStream::new(BufReader::new(stderr).lines());
    while let Some(Ok(line)) = lines.next().await {
        tracing::debug!(target: "toolcall::server", "{line}");
    }
}

struct Running {
    child: AsyncGroupChild,
    peer: Arc<RpcPeer>,
    writer: LineWriter,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

/// Transport over a spawned server's standard streams.
///
/// The server runs in its own process group; closing the transport ends the
/// whole group and reaps the leader.
pub struct PipeTransport {
    config: PipeTransportConfig,
    state: Option<Running>,
}

impl PipeTransport {
    /// Create a transport that spawns the configured server on connect.
    #[must_use]
    pub const fn new(config: PipeTransportConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Server process id, while running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.state.as_ref().and_then(|s| s.child.id())
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn kind(&self) -> &'static str {
        "pipe"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.state.is_some() {
            return Err(ConnectionError::Config(
                "Transport already connected".to_string(),
            ));
        }

        let parts = self
            .config
            .command
            .build()
            .map_err(|e| ConnectionError::Config(e.to_string()))?;
        let name = parts.program.clone();
        let (program, args) = parts
            .into_resolved()
            .await
            .map_err(|e| ConnectionError::Spawn {
                program: name.clone(),
                reason: e.to_string(),
            })?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.group_spawn().map_err(|e| ConnectionError::Spawn {
            program: name.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.inner().stdin.take();
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill().await;
            return Err(ConnectionError::Spawn {
                program: name,
                reason: "standard streams not captured".to_string(),
            });
        };

        tracing::info!(program = %program.display(), pid = ?child.id(), "Server process started");

        let peer = Arc::new(RpcPeer::new());
        let writer = LineWriter::new(stdin);
        let reader = tokio::spawn(read_loop(stdout, Arc::clone(&peer), writer.clone()));
        let stderr = stderr.map(|s| tokio::spawn(forward_stderr(s)));

        self.state = Some(Running {
            child,
            peer,
            writer,
            reader,
            stderr,
        });
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let state = self.state.as_ref().ok_or(ChannelError::NotConnected)?;
        let (id, message, rx) = state.peer.begin(method, params)?;
        tracing::debug!(id, method, "Writing request");

        if let Err(e) = state.writer.send(&message).await {
            state.peer.cancel(id);
            return Err(e);
        }
        RpcPeer::wait(rx).await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ChannelError> {
        let state = self.state.as_ref().ok_or(ChannelError::NotConnected)?;
        tracing::debug!(method, "Writing notification");
        state
            .writer
            .send(&OutgoingMessage::notification(method, params))
            .await
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };

        state.writer.shut().await;
        let grace = self.config.shutdown_grace;
        match tokio::time::timeout(grace, state.child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "Server process exited"),
            Ok(Err(e)) => tracing::warn!("Failed to wait for server process: {e}"),
            Err(_) => {
                tracing::warn!("Server process still running after {grace:?}, killing");
                if let Err(e) = state.child.kill().await {
                    tracing::warn!("Failed to kill server process group: {e}");
                }
                let _ = state.child.wait().await;
            }
        }

        state.peer.fail_all();
        state.reader.abort();
        if let Some(stderr) = state.stderr {
            stderr.abort();
        }
        Ok(())
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        if let Some(state) = &mut self.state {
            let _ = state.child.start_kill();
            state.reader.abort();
        }
    }
}
