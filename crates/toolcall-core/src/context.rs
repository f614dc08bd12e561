//! Identity exchanged during the session handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client identity sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl ClientInfo {
    /// Create a client identity.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Build the `initialize` request parameters for this client.
    #[must_use]
    pub fn initialize_params(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": self,
        })
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("toolcall-client", env!("CARGO_PKG_VERSION"))
    }
}

/// Server identity reported by the `initialize` result.
///
/// Every field is optional: servers are free to omit them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: Option<String>,
    /// Server version.
    pub version: Option<String>,
    /// Negotiated protocol revision.
    pub protocol_version: Option<String>,
}

impl ServerInfo {
    /// Read the server identity out of an `initialize` result.
    #[must_use]
    pub fn from_initialize_result(result: &Value) -> Self {
        let info = result.get("serverInfo");
        let field = |key: &str| {
            info.and_then(|i| i.get(key))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        };
        Self {
            name: field("name"),
            version: field("version"),
            protocol_version: result
                .get("protocolVersion")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }
    }
}
