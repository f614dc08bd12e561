//! Request/response correlation shared by all transports.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tokio::sync::oneshot;
use toolcall_core::ChannelError;

use crate::protocol::{Incoming, METHOD_NOT_FOUND, OutgoingMessage};

type Reply = Result<Value, ChannelError>;

struct Inner {
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

/// Tracks in-flight requests on one channel.
///
/// Transports write the messages produced by [`RpcPeer::begin`] and feed every
/// incoming line to [`RpcPeer::handle_line`]. When the channel goes away,
/// [`RpcPeer::fail_all`] completes whatever is still waiting.
pub struct RpcPeer {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for RpcPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcPeer {
    /// Create a new peer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request.
    ///
    /// Returns the id, the message to send, and a receiver for the reply.
    ///
    /// # Errors
    /// Returns `Closed` if the channel has already shut down.
    pub fn begin(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(u64, OutgoingMessage, oneshot::Receiver<Reply>), ChannelError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(id, tx);

        Ok((id, OutgoingMessage::request(id, method, params), rx))
    }

    /// Forget a request whose message could not be sent.
    pub fn cancel(&self, id: u64) {
        self.lock().pending.remove(&id);
    }

    /// Number of requests still waiting for a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether [`RpcPeer::fail_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Handle one incoming message.
    ///
    /// Returns a message that must be sent back, for server-initiated requests.
    pub fn handle_line(&self, raw: &str) -> Option<OutgoingMessage> {
        let message = match Incoming::parse(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Ignoring unreadable message ({e}): {raw}");
                return None;
            }
        };

        match message {
            Incoming::Response { id, outcome } => {
                self.complete(&id, outcome.map_err(|e| ChannelError::Remote {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                }));
                None
            }
            Incoming::Request { id, method, .. } => {
                if method == "ping" {
                    Some(OutgoingMessage::reply(id, serde_json::json!({})))
                } else {
                    tracing::debug!("Declining server request '{method}'");
                    Some(OutgoingMessage::error_reply(
                        id,
                        METHOD_NOT_FOUND,
                        format!("Method not supported by client: {method}"),
                    ))
                }
            }
            Incoming::Notification { method, params } => {
                tracing::debug!(?params, "Server notification '{method}'");
                None
            }
        }
    }

    fn complete(&self, id: &Value, reply: Reply) {
        let sender = id.as_u64().and_then(|id| self.lock().pending.remove(&id));
        match sender {
            Some(tx) => {
                // The requester may have gone away; nothing to do then.
                let _ = tx.send(reply);
            }
            None => tracing::warn!("Dropping response for unknown request id {id}"),
        }
    }

    /// Fail every pending request with `Closed` and refuse new ones.
    pub fn fail_all(&self) {
        self.lock().closed = true;
        self.fail_pending();
    }

    /// Fail every pending request with `Closed`; new requests are still accepted.
    ///
    /// Used when the remote session is lost but the channel is being re-opened.
    pub fn fail_pending(&self) {
        let drained: Vec<_> = self.lock().pending.drain().collect();

        if !drained.is_empty() {
            tracing::debug!("Failing {} pending request(s)", drained.len());
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(ChannelError::Closed));
        }
    }

    /// Wait for the reply to a request started with [`RpcPeer::begin`].
    ///
    /// # Errors
    /// Returns the remote error, or `Closed` if the channel went away first.
    pub async fn wait(rx: oneshot::Receiver<Reply>) -> Reply {
        rx.await.unwrap_or(Err(ChannelError::Closed))
    }
}
