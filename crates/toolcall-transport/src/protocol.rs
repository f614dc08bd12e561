//! JSON-RPC 2.0 wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code for server requests this client does not handle.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    Invalid(&'static str),
}

/// Error member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorObject>,
}

impl OutgoingMessage {
    const fn empty() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    /// Create a request.
    #[must_use]
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(Value::from(id)),
            method: Some(method.into()),
            params: Some(params),
            ..Self::empty()
        }
    }

    /// Create a notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
            ..Self::empty()
        }
    }

    /// Create a successful reply to a server request.
    #[must_use]
    pub fn reply(id: Value, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Self::empty()
        }
    }

    /// Create an error reply to a server request.
    #[must_use]
    pub fn error_reply(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
            ..Self::empty()
        }
    }

    /// Method name, for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Serialize to a single line of JSON.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Response to one of our requests.
    Response {
        id: Value,
        outcome: Result<Value, RpcErrorObject>,
    },
    /// Request initiated by the server.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// Notification from the server.
    Notification {
        method: String,
        params: Option<Value>,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl Incoming {
    /// Parse one incoming message.
    ///
    /// # Errors
    /// Returns error if the text is not a JSON-RPC message.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let msg: RawMessage = serde_json::from_str(raw)?;
        let id = msg.id.filter(|id| !id.is_null());

        match (id, msg.method) {
            (Some(id), Some(method)) => Ok(Self::Request {
                id,
                method,
                params: msg.params,
            }),
            (None, Some(method)) => Ok(Self::Notification {
                method,
                params: msg.params,
            }),
            (Some(id), None) => {
                let outcome = match msg.error {
                    Some(error) => Err(error),
                    None => Ok(msg.result.unwrap_or(Value::Null)),
                };
                Ok(Self::Response { id, outcome })
            }
            (None, None) => Err(ProtocolError::Invalid("neither id nor method present")),
        }
    }
}
