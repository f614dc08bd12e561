//! Session lifecycle and orchestration for the remote tool-invocation service.
//!
//! Provides:
//! - `SessionManager` - Connect, invoke and guaranteed disconnect over one transport
//! - `OrchestrationScript` - The dependent multi-step script
//! - `Reporter` / `ScriptReport` - Script output and run records

pub mod manager;
pub mod report;
pub mod script;

#[cfg(test)]
mod testing;

pub use manager::{SessionError, SessionManager, SessionState, SessionTask};
pub use report::{MemoryReporter, Reporter, ScriptEvent, ScriptReport, StepOutcome, StepRecord};
pub use script::{ConfigArg, OrchestrationScript, ScriptOptions};
