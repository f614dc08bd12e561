//! Script output and run records.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use toolcall_core::ExtractedResult;
use uuid::Uuid;

/// Something the script wants shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// A step is about to run.
    Step { title: String },
    /// An advertised tool.
    Capability {
        name: String,
        description: Option<String>,
    },
    /// One listing line.
    Item { text: String },
    /// A record returned by a step.
    Record { label: String, value: Value },
    /// Explanation for an empty result or a skipped step.
    Notice { text: String },
    /// A step's operation failed on the remote side.
    DomainError {
        tool: String,
        message: String,
        code: Option<String>,
    },
}

/// Receives script output.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ScriptEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ScriptEvent>>,
}

impl MemoryReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<ScriptEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text of every notice, in order.
    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScriptEvent::Notice { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: ScriptEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Invoked; `kind` is the extracted result kind.
    Completed { kind: String },
    /// Not invoked.
    Skipped { reason: String },
    /// Invoked; the response described a failed operation.
    DomainError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl StepOutcome {
    /// Outcome for an invoked step.
    #[must_use]
    pub fn from_result(result: &ExtractedResult) -> Self {
        match result {
            ExtractedResult::Error { message, code } => Self::DomainError {
                message: message.clone(),
                code: code.clone(),
            },
            other => Self::Completed {
                kind: other.kind().to_string(),
            },
        }
    }
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub tool: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Record of a whole script run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptReport {
    pub run_id: Uuid,
    pub steps: Vec<StepRecord>,
}

impl ScriptReport {
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            steps: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, tool: &str, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            tool: tool.to_string(),
            outcome,
        });
    }

    /// First record for `tool`.
    #[must_use]
    pub fn step(&self, tool: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.tool == tool)
    }

    /// Whether `tool` was invoked at least once.
    #[must_use]
    pub fn invoked(&self, tool: &str) -> bool {
        self.steps
            .iter()
            .any(|s| s.tool == tool && !matches!(s.outcome, StepOutcome::Skipped { .. }))
    }

    /// Number of steps that ended in a domain error.
    #[must_use]
    pub fn domain_errors(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::DomainError { .. }))
            .count()
    }
}
