//! Session lifecycle over one transport.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value, json};
use toolcall_core::{
    ClientInfo, ConnectionError, InvocationError, InvocationRequest, ResponseEnvelope, ServerInfo,
    ToolInfo, Transport,
};
use tracing::Instrument;

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("Session is not connected")]
    NotConnected,
    #[error("Session was already connected")]
    AlreadyConnected,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet connected (or the connect attempt failed).
    Idle,
    /// Handshake completed; invocations are allowed.
    Connected,
    /// Disconnected; the session cannot be reused.
    Closed,
}

/// Work run inside [`SessionManager::scoped`].
#[async_trait]
pub trait SessionTask: Send + Sync {
    type Output: Send;

    /// Run against a connected session.
    async fn run(&self, session: &SessionManager) -> Result<Self::Output, SessionError>;
}

/// Owns one transport for one connect-to-disconnect lifetime.
pub struct SessionManager {
    transport: Box<dyn Transport>,
    client: ClientInfo,
    state: SessionState,
    server: Option<ServerInfo>,
}

impl SessionManager {
    /// Create a session over `transport` with the default client identity.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_client(transport, ClientInfo::default())
    }

    /// Create a session announcing `client` during the handshake.
    #[must_use]
    pub fn with_client(transport: Box<dyn Transport>, client: ClientInfo) -> Self {
        Self {
            transport,
            client,
            state: SessionState::Idle,
            server: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Server identity from the handshake.
    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Label of the underlying transport.
    #[must_use]
    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Establish the channel and perform the protocol handshake.
    ///
    /// # Errors
    /// Returns `AlreadyConnected` unless the session is idle, and a
    /// connection error if the transport or the handshake fails.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyConnected);
        }

        tracing::info!(transport = self.transport.kind(), "Connecting");
        self.transport.connect().await?;

        let result = self
            .transport
            .request("initialize", self.client.initialize_params())
            .await
            .map_err(|e| ConnectionError::Handshake(format!("initialize: {e}")))?;
        self.transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(|e| ConnectionError::Handshake(format!("initialized notification: {e}")))?;

        let server = ServerInfo::from_initialize_result(&result);
        tracing::info!(
            server = ?server.name,
            version = ?server.version,
            protocol = ?server.protocol_version,
            "Session established"
        );
        self.server = Some(server);
        self.state = SessionState::Connected;
        Ok(())
    }

    const fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::Idle | SessionState::Closed => Err(SessionError::NotConnected),
        }
    }

    /// Tools advertised by the remote. Diagnostic only.
    ///
    /// # Errors
    /// Returns error if not connected or the request fails.
    pub async fn list_capabilities(&self) -> Result<Vec<ToolInfo>, SessionError> {
        self.ensure_connected()?;
        let result = self
            .transport
            .request("tools/list", json!({}))
            .await
            .map_err(|e| InvocationError::new("tools/list", e))?;
        Ok(ToolInfo::list_from_result(&result))
    }

    /// Invoke a tool by name.
    ///
    /// # Errors
    /// Returns error if not connected or the remote reports a protocol fault.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<ResponseEnvelope, SessionError> {
        self.call(&InvocationRequest::with_arguments(tool, arguments))
            .await
    }

    /// Send a prepared invocation request.
    ///
    /// # Errors
    /// Returns error if not connected or the remote reports a protocol fault.
    pub async fn call(&self, request: &InvocationRequest) -> Result<ResponseEnvelope, SessionError> {
        self.ensure_connected()?;

        let span = tracing::info_span!("tool", name = %request.name);
        async {
            let params = request.to_params();
            tracing::debug!(arguments = %params["arguments"], "Invoking");
            let result = self
                .transport
                .request("tools/call", params)
                .await
                .map_err(|e| InvocationError::new(request.name.clone(), e))?;

            let envelope = ResponseEnvelope::from_result(result);
            tracing::debug!(
                items = envelope.content.len(),
                is_error = envelope.is_error,
                "Tool returned"
            );
            Ok(envelope)
        }
        .instrument(span)
        .await
    }

    /// Release the channel.
    ///
    /// The transport is closed on the first call whatever the state, so a
    /// partially established channel is released too. Later calls do nothing.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        tracing::info!(transport = self.transport.kind(), "Disconnecting");
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Failed to close transport cleanly: {e}");
        }
    }

    /// Connect, run `task`, then disconnect on every path.
    ///
    /// A panic inside the task resumes after the channel is released.
    ///
    /// # Errors
    /// Returns the connect error or the task's error.
    pub async fn scoped<T>(&mut self, task: &T) -> Result<T::Output, SessionError>
    where
        T: SessionTask + ?Sized,
    {
        let outcome = AssertUnwindSafe(async {
            self.connect().await?;
            task.run(self).await
        })
        .catch_unwind()
        .await;

        self.disconnect().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.state == SessionState::Connected {
            tracing::warn!(
                transport = self.transport.kind(),
                "Session dropped while connected; the transport is released without a clean close"
            );
        }
    }
}
