//! Console output for script events.

use std::io::Write;

use serde_json::Value;
use toolcall_session::{Reporter, ScriptEvent};

/// Prints script events on stdout, as text or as JSON lines.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    json: bool,
}

impl ConsoleReporter {
    #[must_use]
    pub const fn new(json: bool) -> Self {
        Self { json }
    }
}

/// Human-readable rendering of one event.
#[must_use]
pub fn render(event: &ScriptEvent) -> String {
    match event {
        ScriptEvent::Step { title } => format!("\n{title}..."),
        ScriptEvent::Capability { name, description } => match description {
            Some(description) => format!("- {name}: {description}"),
            None => format!("- {name}"),
        },
        ScriptEvent::Item { text } | ScriptEvent::Notice { text } => text.clone(),
        ScriptEvent::Record {
            label,
            value: Value::String(text),
        } => format!("{label}: {text}"),
        ScriptEvent::Record { label, value } => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("{label}: {pretty}")
        }
        ScriptEvent::DomainError {
            tool,
            message,
            code,
        } => match code {
            Some(code) => format!("{tool} failed ({code}): {message}"),
            None => format!("{tool} failed: {message}"),
        },
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: ScriptEvent) {
        let line = if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Cannot serialize script event: {e}");
                    return;
                }
            }
        } else {
            render(&event)
        };

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}") {
            tracing::debug!("Cannot write to stdout: {e}");
        }
    }
}
