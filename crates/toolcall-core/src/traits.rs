//! Capability trait implemented by every transport.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ChannelError, ConnectionError};

/// A message channel to the remote tool-invocation service.
///
/// Implementations carry JSON-RPC requests and notifications; everything
/// above the message level (handshake, tool calls) lives in the session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short transport label for logs.
    fn kind(&self) -> &'static str;

    /// Establish the underlying channel.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Send a request and wait for its result.
    ///
    /// No client-side timeout is applied beyond what the transport enforces.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Value) -> Result<(), ChannelError>;

    /// Release the channel.
    ///
    /// Must be safe after a failed or partial `connect` and after a previous
    /// `close`.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}
