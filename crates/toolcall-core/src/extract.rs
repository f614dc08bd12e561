//! Turning response envelopes into typed results.
//!
//! Remote response shapes are not contractually fixed, so parsing here is
//! total: every envelope maps to some [`ExtractedResult`], degrading to an
//! opaque string when the payload is not structured data.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::ResponseEnvelope;

/// Message used when the remote flags an error but sends no content.
const EMPTY_ERROR_MESSAGE: &str = "Tool reported an error without content";

/// Outcome of parsing a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedResult {
    /// No content at all.
    Empty,
    /// A single object, primitive, or opaque string.
    Single { value: Value },
    /// A list of records, in remote order.
    List { items: Vec<Value> },
    /// A well-formed response describing a failed operation.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ExtractedResult {
    /// Short label for logs and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Single { .. } => "single",
            Self::List { .. } => "list",
            Self::Error { .. } => "error",
        }
    }

    /// True for results that dependent steps must not build on:
    /// `Empty`, an empty `List`, or `Error`.
    #[must_use]
    pub fn is_empty_like(&self) -> bool {
        match self {
            Self::Empty | Self::Error { .. } => true,
            Self::List { items } => items.is_empty(),
            Self::Single { .. } => false,
        }
    }

    /// List items; empty for every other variant.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        match self {
            Self::List { items } => items,
            _ => &[],
        }
    }

    /// The single value, if this is `Single`.
    #[must_use]
    pub const fn single(&self) -> Option<&Value> {
        match self {
            Self::Single { value } => Some(value),
            _ => None,
        }
    }

    /// The error message, if this is `Error`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Recognizes domain errors inside an otherwise successful response.
///
/// The error contract of the remote service is external, so the recognizer
/// is pluggable.
pub trait ErrorClassifier: Send + Sync {
    /// Return `(message, code)` if `object` describes a failure.
    fn classify(&self, object: &Map<String, Value>) -> Option<(String, Option<String>)>;
}

/// Field-driven error recognizer.
///
/// An object is an error when
/// 1. one of `error_fields` holds a non-empty string (that string is the message),
/// 2. one of `error_fields` holds an object with a string message field, or
/// 3. one of `flags` matches and one of `message_fields` holds a string.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldErrorShape {
    /// Fields that carry an error description directly.
    pub error_fields: Vec<String>,
    /// `(field, value)` pairs that mark an object as failed.
    pub flags: Vec<(String, Value)>,
    /// Fields holding the human-readable message.
    pub message_fields: Vec<String>,
    /// Fields holding an error code.
    pub code_fields: Vec<String>,
}

impl Default for FieldErrorShape {
    fn default() -> Self {
        Self {
            error_fields: vec!["error".to_string()],
            flags: vec![
                ("isError".to_string(), Value::Bool(true)),
                ("success".to_string(), Value::Bool(false)),
                ("status".to_string(), Value::String("error".to_string())),
            ],
            message_fields: vec!["message".to_string()],
            code_fields: vec!["code".to_string(), "statusCode".to_string()],
        }
    }
}

impl FieldErrorShape {
    fn message_in<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a str> {
        self.message_fields
            .iter()
            .find_map(|f| object.get(f).and_then(Value::as_str))
    }

    fn code_in(&self, object: &Map<String, Value>) -> Option<String> {
        self.code_fields.iter().find_map(|f| match object.get(f)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

impl ErrorClassifier for FieldErrorShape {
    fn classify(&self, object: &Map<String, Value>) -> Option<(String, Option<String>)> {
        for field in &self.error_fields {
            match object.get(field) {
                Some(Value::String(message)) if !message.is_empty() => {
                    return Some((message.clone(), self.code_in(object)));
                }
                Some(Value::Object(inner)) => {
                    if let Some(message) = self.message_in(inner) {
                        let code = self.code_in(inner).or_else(|| self.code_in(object));
                        return Some((message.to_string(), code));
                    }
                }
                _ => {}
            }
        }

        let flagged = self
            .flags
            .iter()
            .any(|(field, value)| object.get(field) == Some(value));
        if flagged {
            if let Some(message) = self.message_in(object) {
                return Some((message.to_string(), self.code_in(object)));
            }
        }

        None
    }
}

/// Parses response envelopes with a configurable error recognizer.
#[derive(Clone)]
pub struct ResponseExtractor {
    classifier: Arc<dyn ErrorClassifier>,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new(FieldErrorShape::default())
    }
}

impl std::fmt::Debug for ResponseExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseExtractor").finish_non_exhaustive()
    }
}

impl ResponseExtractor {
    /// Create an extractor with the given error recognizer.
    #[must_use]
    pub fn new(classifier: impl ErrorClassifier + 'static) -> Self {
        Self {
            classifier: Arc::new(classifier),
        }
    }

    /// Parse an envelope. Never fails and never modifies its input.
    #[must_use]
    pub fn parse(&self, envelope: &ResponseEnvelope) -> ExtractedResult {
        let result = self.parse_content(envelope);
        if !envelope.is_error {
            return result;
        }

        match result {
            ExtractedResult::Error { .. } => result,
            ExtractedResult::Empty => ExtractedResult::Error {
                message: EMPTY_ERROR_MESSAGE.to_string(),
                code: None,
            },
            _ => ExtractedResult::Error {
                message: envelope
                    .first()
                    .and_then(|item| item.text_payload())
                    .map_or_else(|| EMPTY_ERROR_MESSAGE.to_string(), ToOwned::to_owned),
                code: None,
            },
        }
    }

    fn parse_content(&self, envelope: &ResponseEnvelope) -> ExtractedResult {
        let Some(first) = envelope.first() else {
            return ExtractedResult::Empty;
        };

        let Some(text) = first.text_payload() else {
            return ExtractedResult::Single {
                value: first.to_value(),
            };
        };

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => ExtractedResult::List { items },
            Ok(Value::Object(object)) => match self.classifier.classify(&object) {
                Some((message, code)) => ExtractedResult::Error { message, code },
                None => ExtractedResult::Single {
                    value: Value::Object(object),
                },
            },
            Ok(primitive) => ExtractedResult::Single { value: primitive },
            Err(e) => {
                tracing::debug!("Payload is not JSON, passing through as text: {e}");
                ExtractedResult::Single {
                    value: Value::String(text.to_string()),
                }
            }
        }
    }
}

/// Parse with the default error recognizer.
#[must_use]
pub fn parse(envelope: &ResponseEnvelope) -> ExtractedResult {
    ResponseExtractor::default().parse(envelope)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::ContentItem;

    fn text(payload: &str) -> ResponseEnvelope {
        ResponseEnvelope::from_text(payload)
    }

    #[test]
    fn test_empty_envelope() {
        assert_eq!(parse(&ResponseEnvelope::default()), ExtractedResult::Empty);
    }

    #[test]
    fn test_array_keeps_length_and_elements() {
        let records = json!([
            { "id": "a1", "name": "X" },
            { "id": "a2", "name": "Y", "model": { "provider": "openai" } },
            42
        ]);
        let result = parse(&text(&records.to_string()));
        assert_eq!(result.kind(), "list");
        assert_eq!(result.items(), records.as_array().unwrap().as_slice());
    }

    #[test]
    fn test_empty_array_is_empty_like() {
        let result = parse(&text("[]"));
        assert_eq!(result, ExtractedResult::List { items: vec![] });
        assert!(result.is_empty_like());
    }

    #[test]
    fn test_malformed_payload_passes_through() {
        for raw in ["Assistant not found", "{ broken", "", "[1, 2"] {
            let result = parse(&text(raw));
            assert_eq!(
                result,
                ExtractedResult::Single {
                    value: Value::String(raw.to_string())
                }
            );
        }
    }

    #[test]
    fn test_plain_object_is_single() {
        let call = json!({ "id": "c1", "status": "queued", "customer": {} });
        let result = parse(&text(&call.to_string()));
        assert_eq!(result.single(), Some(&call));
        assert!(!result.is_empty_like());
    }

    #[test]
    fn test_primitives_are_single() {
        assert_eq!(parse(&text("7")).single(), Some(&json!(7)));
        assert_eq!(parse(&text("true")).single(), Some(&json!(true)));
        assert_eq!(parse(&text("null")).single(), Some(&Value::Null));
        assert_eq!(parse(&text("\"ok\"")).single(), Some(&json!("ok")));
    }

    #[test]
    fn test_error_string_field() {
        let result = parse(&text(r#"{"error":"Assistant not found","statusCode":404}"#));
        assert_eq!(
            result,
            ExtractedResult::Error {
                message: "Assistant not found".to_string(),
                code: Some("404".to_string()),
            }
        );
    }

    #[test]
    fn test_error_object_field() {
        let result = parse(&text(
            r#"{"error":{"message":"Invalid phone number","code":"E_PHONE"}}"#,
        ));
        assert_eq!(result.error_message(), Some("Invalid phone number"));
        assert_eq!(
            result,
            ExtractedResult::Error {
                message: "Invalid phone number".to_string(),
                code: Some("E_PHONE".to_string()),
            }
        );
    }

    #[test]
    fn test_flag_needs_message() {
        let flagged = parse(&text(r#"{"success":false,"message":"quota exceeded"}"#));
        assert_eq!(flagged.error_message(), Some("quota exceeded"));

        // A call whose status is a normal lifecycle value is not an error.
        let call = parse(&text(r#"{"id":"c1","status":"ended","message":"bye"}"#));
        assert_eq!(call.kind(), "single");

        // A flag without a message is not a recognized error shape.
        let bare = parse(&text(r#"{"success":false}"#));
        assert_eq!(bare.kind(), "single");
    }

    #[test]
    fn test_null_error_field_is_not_an_error() {
        let result = parse(&text(r#"{"id":"a1","error":null}"#));
        assert_eq!(result.kind(), "single");
    }

    #[test]
    fn test_custom_classifier() {
        struct FaultField;
        impl ErrorClassifier for FaultField {
            fn classify(&self, object: &Map<String, Value>) -> Option<(String, Option<String>)> {
                object
                    .get("fault")
                    .and_then(Value::as_str)
                    .map(|m| (m.to_string(), None))
            }
        }

        let extractor = ResponseExtractor::new(FaultField);
        assert_eq!(
            extractor.parse(&text(r#"{"fault":"boom"}"#)).error_message(),
            Some("boom")
        );
        assert_eq!(extractor.parse(&text(r#"{"error":"ignored"}"#)).kind(), "single");
    }

    #[test]
    fn test_first_item_is_authoritative() {
        let envelope = ResponseEnvelope {
            content: vec![ContentItem::text("[1]"), ContentItem::text("not json")],
            is_error: false,
        };
        assert_eq!(parse(&envelope).items(), [json!(1)].as_slice());
    }

    #[test]
    fn test_non_text_first_item() {
        let item: ContentItem =
            serde_json::from_value(json!({ "type": "image", "data": "AA==" })).unwrap();
        let envelope = ResponseEnvelope {
            content: vec![item],
            is_error: false,
        };
        assert_eq!(
            parse(&envelope).single(),
            Some(&json!({ "type": "image", "data": "AA==" }))
        );
    }

    #[test]
    fn test_is_error_envelope() {
        let mut envelope = text("Missing required argument: callId");
        envelope.is_error = true;
        assert_eq!(
            parse(&envelope).error_message(),
            Some("Missing required argument: callId")
        );

        let empty = ResponseEnvelope {
            content: vec![],
            is_error: true,
        };
        assert_eq!(parse(&empty).error_message(), Some(EMPTY_ERROR_MESSAGE));

        let mut shaped = text(r#"{"error":"nope","code":"E1"}"#);
        shaped.is_error = true;
        assert_eq!(
            parse(&shaped),
            ExtractedResult::Error {
                message: "nope".to_string(),
                code: Some("E1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_does_not_modify_input() {
        let envelope = text(r#"[{"id":"p1"}]"#);
        let before = envelope.clone();
        let _ = parse(&envelope);
        assert_eq!(envelope, before);
    }
}
