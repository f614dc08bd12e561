//! Core abstractions for driving a remote tool-invocation service.
//!
//! This crate provides the fundamental building blocks:
//! - `ResponseEnvelope` / `ContentItem` - Generic result of a tool call
//! - `ResponseExtractor` - Total parsing of envelopes into typed results
//! - `Transport` - Capability trait implemented by every transport
//! - Domain record views (`Assistant`, `PhoneNumber`, `Call`)

pub mod context;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod traits;

pub use context::{ClientInfo, ServerInfo};
pub use domain::{Assistant, Call, Customer, PhoneNumber};
pub use envelope::{ContentItem, InvocationRequest, ResponseEnvelope, ToolInfo};
pub use error::{ChannelError, ConnectionError, InvocationError};
pub use extract::{ErrorClassifier, ExtractedResult, FieldErrorShape, ResponseExtractor};
pub use traits::Transport;
