//! The end-to-end orchestration script.
//!
//! Steps run strictly in order. Identifiers extracted by earlier steps feed
//! later ones; a step whose inputs are missing is skipped with a notice while
//! independent steps still run. Only protocol faults end the run early.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use toolcall_core::{
    Assistant, Call, Customer, ExtractedResult, PhoneNumber, ResponseExtractor, domain::record_id,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    manager::{SessionError, SessionManager, SessionTask},
    report::{Reporter, ScriptEvent, ScriptReport, StepOutcome},
};

/// Script options.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Number to call; the remote decides when absent.
    pub customer_number: Option<String>,
    /// ISO-8601 time to schedule the call at; immediate when absent.
    pub scheduled_at: Option<String>,
    /// Run the three `create_assistant` variants. These create real records.
    pub create_assistants: bool,
    /// Names for the plain, configured and encoded-config assistants.
    pub assistant_names: [String; 3],
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            customer_number: None,
            scheduled_at: None,
            create_assistants: false,
            assistant_names: [
                "My Assistant".to_string(),
                "Custom Assistant".to_string(),
                "String LLM Assistant".to_string(),
            ],
        }
    }
}

/// A configuration argument the remote accepts either as an object or as a
/// JSON-encoded string.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigArg {
    Object(Value),
    Encoded(String),
}

impl ConfigArg {
    /// Encode `config` as a JSON string argument.
    #[must_use]
    pub fn encoded(config: &Value) -> Self {
        Self::Encoded(config.to_string())
    }

    /// Argument value as sent on the wire.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Object(value) => value,
            Self::Encoded(text) => Value::String(text),
        }
    }
}

/// Arguments for `create_assistant`.
#[must_use]
pub fn assistant_arguments(
    name: &str,
    llm: Option<ConfigArg>,
    voice: Option<ConfigArg>,
) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("name".to_string(), Value::from(name));
    if let Some(llm) = llm {
        arguments.insert("llm".to_string(), llm.into_value());
    }
    if let Some(voice) = voice {
        arguments.insert("voice".to_string(), voice.into_value());
    }
    arguments
}

/// Arguments for `create_call`. `scheduledAt` is left out when unset.
#[must_use]
pub fn call_arguments(
    assistant_id: &str,
    phone_number_id: &str,
    customer: &Customer,
    scheduled_at: Option<&str>,
) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("assistantId".to_string(), Value::from(assistant_id));
    arguments.insert("phoneNumberId".to_string(), Value::from(phone_number_id));
    arguments.insert(
        "customer".to_string(),
        serde_json::to_value(customer).unwrap_or_else(|_| json!({})),
    );
    if let Some(at) = scheduled_at {
        arguments.insert("scheduledAt".to_string(), Value::from(at));
    }
    arguments
}

fn single_argument(key: &str, value: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert(key.to_string(), Value::from(value));
    arguments
}

/// First list item's string id.
fn first_id(result: &ExtractedResult) -> Option<String> {
    result.items().first().and_then(record_id).map(ToOwned::to_owned)
}

/// Lists assistants, phone numbers and calls, then places and looks up a call.
pub struct OrchestrationScript {
    options: ScriptOptions,
    extractor: ResponseExtractor,
    reporter: Arc<dyn Reporter>,
}

impl OrchestrationScript {
    /// Create a script with the default error recognizer.
    #[must_use]
    pub fn new(options: ScriptOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            options,
            extractor: ResponseExtractor::default(),
            reporter,
        }
    }

    /// Use a custom extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: ResponseExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    fn emit(&self, event: ScriptEvent) {
        self.reporter.report(event);
    }

    fn notice(&self, text: impl Into<String>) {
        self.emit(ScriptEvent::Notice { text: text.into() });
    }

    fn skip(&self, report: &mut ScriptReport, tool: &str, reason: &str) {
        tracing::debug!(tool, reason, "Step skipped");
        report.record(
            tool,
            StepOutcome::Skipped {
                reason: reason.to_string(),
            },
        );
    }

    /// Invoke, extract and record one step.
    async fn step(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
        title: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<ExtractedResult, SessionError> {
        self.emit(ScriptEvent::Step {
            title: title.to_string(),
        });

        let envelope = session.invoke(tool, arguments).await?;
        let result = self.extractor.parse(&envelope);
        tracing::debug!(tool, kind = result.kind(), "Step completed");

        if let ExtractedResult::Error { message, code } = &result {
            tracing::warn!(tool, %message, "Remote reported a failed operation");
            self.emit(ScriptEvent::DomainError {
                tool: tool.to_string(),
                message: message.clone(),
                code: code.clone(),
            });
        }
        report.record(tool, StepOutcome::from_result(&result));
        Ok(result)
    }

    fn show_record(&self, label: &str, result: &ExtractedResult) {
        if let Some(value) = result.single() {
            self.emit(ScriptEvent::Record {
                label: label.to_string(),
                value: value.clone(),
            });
        }
    }

    /// A list step answered with a plain value: show it as the remote sent it.
    fn show_unlisted(&self, result: &ExtractedResult) {
        self.show_record("Remote response", result);
    }

    async fn show_capabilities(&self, session: &SessionManager) -> Result<(), SessionError> {
        self.emit(ScriptEvent::Step {
            title: "Available tools".to_string(),
        });
        for tool in session.list_capabilities().await? {
            self.emit(ScriptEvent::Capability {
                name: tool.name,
                description: tool.description,
            });
        }
        Ok(())
    }

    async fn list_assistants(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
    ) -> Result<Option<String>, SessionError> {
        let result = self
            .step(session, report, "Listing assistants", "list_assistants", Map::new())
            .await?;
        self.show_unlisted(&result);
        if result.items().is_empty() {
            self.notice("No assistants found");
            return Ok(None);
        }
        for item in result.items() {
            self.emit(ScriptEvent::Item {
                text: format!("- {}", Assistant::from_value(item).summary_line()),
            });
        }
        Ok(first_id(&result))
    }

    async fn get_assistant(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
        assistant_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let Some(id) = assistant_id else {
            self.notice("No assistant ID found");
            self.skip(report, "get_assistant", "no assistant id");
            return Ok(());
        };
        let result = self
            .step(
                session,
                report,
                "Getting assistant",
                "get_assistant",
                single_argument("assistantId", id),
            )
            .await?;
        self.show_record("Assistant", &result);
        Ok(())
    }

    async fn create_assistants(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
    ) -> Result<(), SessionError> {
        let [plain, custom, encoded] = &self.options.assistant_names;
        let variants = [
            (
                "Creating assistant",
                assistant_arguments(plain, None, None),
            ),
            (
                "Creating assistant with custom configuration",
                assistant_arguments(
                    custom,
                    Some(ConfigArg::Object(json!({
                        "provider": "anthropic",
                        "model": "claude-3-7-sonnet-20250219"
                    }))),
                    Some(ConfigArg::Object(json!({ "provider": "11labs", "voiceId": "sarah" }))),
                ),
            ),
            (
                "Creating assistant with string-encoded LLM configuration",
                assistant_arguments(
                    encoded,
                    Some(ConfigArg::encoded(&json!({
                        "provider": "openai",
                        "model": "gpt-4o-mini"
                    }))),
                    Some(ConfigArg::Object(json!({ "provider": "vapi", "voiceId": "Elliot" }))),
                ),
            ),
        ];

        for (title, arguments) in variants {
            let result = self
                .step(session, report, title, "create_assistant", arguments)
                .await?;
            self.show_record("Created assistant", &result);
        }
        Ok(())
    }

    async fn list_phone_numbers(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
    ) -> Result<Option<String>, SessionError> {
        let result = self
            .step(
                session,
                report,
                "Listing phone numbers",
                "list_phone_numbers",
                Map::new(),
            )
            .await?;
        self.show_unlisted(&result);
        if result.items().is_empty() {
            self.notice("No phone numbers found. Add a phone number to the account first");
            return Ok(None);
        }
        for item in result.items() {
            self.emit(ScriptEvent::Item {
                text: format!("- {}", PhoneNumber::from_value(item).summary_line()),
            });
        }
        Ok(first_id(&result))
    }

    async fn list_calls(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
    ) -> Result<(), SessionError> {
        let result = self
            .step(session, report, "Listing calls", "list_calls", Map::new())
            .await?;
        self.show_unlisted(&result);
        if result.items().is_empty() {
            self.notice("No calls found");
            return Ok(());
        }
        for item in result.items() {
            self.emit(ScriptEvent::Item {
                text: format!("- {}", Call::from_value(item).summary_line()),
            });
        }
        Ok(())
    }

    async fn create_call(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
        assistant_id: Option<&str>,
        phone_number_id: Option<&str>,
    ) -> Result<Option<String>, SessionError> {
        let (Some(assistant_id), Some(phone_number_id)) = (assistant_id, phone_number_id) else {
            self.notice("Cannot create call: need both assistants and phone numbers");
            self.skip(report, "create_call", "missing assistant or phone number");
            return Ok(None);
        };

        self.notice(format!(
            "Creating a call using assistant ({assistant_id}) and phone number ({phone_number_id})"
        ));
        let customer = Customer::new(self.options.customer_number.clone());
        let arguments = call_arguments(
            assistant_id,
            phone_number_id,
            &customer,
            self.options.scheduled_at.as_deref(),
        );
        let result = self
            .step(session, report, "Creating a call", "create_call", arguments)
            .await?;
        self.show_record("Call created", &result);

        Ok(result.single().and_then(record_id).map(ToOwned::to_owned))
    }

    async fn get_call(
        &self,
        session: &SessionManager,
        report: &mut ScriptReport,
        call_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let Some(id) = call_id else {
            self.skip(report, "get_call", "no call id");
            return Ok(());
        };
        let result = self
            .step(
                session,
                report,
                &format!("Getting details for call {id}"),
                "get_call",
                single_argument("callId", id),
            )
            .await?;
        self.show_record("Call details", &result);
        Ok(())
    }

    async fn execute(
        &self,
        session: &SessionManager,
        run_id: Uuid,
    ) -> Result<ScriptReport, SessionError> {
        let mut report = ScriptReport::new(run_id);

        self.show_capabilities(session).await?;

        let assistant_id = self.list_assistants(session, &mut report).await?;
        self.get_assistant(session, &mut report, assistant_id.as_deref())
            .await?;

        if self.options.create_assistants {
            self.create_assistants(session, &mut report).await?;
        }

        let phone_number_id = self.list_phone_numbers(session, &mut report).await?;
        self.list_calls(session, &mut report).await?;

        let call_id = self
            .create_call(
                session,
                &mut report,
                assistant_id.as_deref(),
                phone_number_id.as_deref(),
            )
            .await?;
        self.get_call(session, &mut report, call_id.as_deref())
            .await?;

        tracing::info!(
            steps = report.steps.len(),
            domain_errors = report.domain_errors(),
            "Script finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl SessionTask for OrchestrationScript {
    type Output = ScriptReport;

    async fn run(&self, session: &SessionManager) -> Result<ScriptReport, SessionError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("script", %run_id, transport = session.transport_kind());
        self.execute(session, run_id).instrument(span).await
    }
}
