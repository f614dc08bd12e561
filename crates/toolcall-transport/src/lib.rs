//! Transports for the remote tool-invocation service.
//!
//! Provides:
//! - JSON-RPC wire protocol and request correlation
//! - Event-stream transport over HTTP (feature: stream)
//! - Child-process stdio transport (feature: pipe)

pub mod peer;
pub mod protocol;

#[cfg(feature = "stream")]
pub mod sender;
#[cfg(feature = "stream")]
pub mod sse;
#[cfg(feature = "stream")]
pub mod stream;

#[cfg(feature = "pipe")]
pub mod command;
#[cfg(feature = "pipe")]
pub mod pipe;

pub use peer::RpcPeer;
pub use protocol::{Incoming, OutgoingMessage, RpcErrorObject};

#[cfg(feature = "stream")]
pub use sender::{HeaderInjector, HttpSender, RequestSender};
#[cfg(feature = "stream")]
pub use stream::{DEFAULT_STREAM_URL, StreamTransport, StreamTransportConfig};

#[cfg(feature = "pipe")]
pub use command::{CommandBuilder, CommandParts};
#[cfg(feature = "pipe")]
pub use pipe::{PipeTransport, PipeTransportConfig};
