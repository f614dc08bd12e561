//! Error taxonomy shared by transports and sessions.

use thiserror::Error;

/// The transport could not be established or the credential was rejected.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Endpoint unreachable: {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("Connection rejected by {endpoint} (HTTP {status}): {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Invalid transport configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single request on an established channel failed.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
    #[error("Channel closed")]
    Closed,
    #[error("Transport not connected")]
    NotConnected,
    #[error("HTTP {status} from {endpoint}")]
    Http { endpoint: String, status: u16 },
    #[error("Send failed: {0}")]
    Send(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The remote returned a protocol-level fault for a tool call.
#[derive(Debug, Error)]
#[error("Invocation of '{tool_name}' failed: {cause}")]
pub struct InvocationError {
    /// Tool (or protocol method) that failed.
    pub tool_name: String,
    /// Underlying channel failure.
    #[source]
    pub cause: ChannelError,
}

impl InvocationError {
    /// Create an invocation error.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, cause: ChannelError) -> Self {
        Self {
            tool_name: tool_name.into(),
            cause,
        }
    }

    /// Message provided by the remote, if the fault came from it.
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        match &self.cause {
            ChannelError::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}
