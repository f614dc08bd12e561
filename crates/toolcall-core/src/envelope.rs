//! Request and response shapes of a tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named tool call with its arguments.
///
/// Built fresh for every step and never touched after it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    /// Create a request with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// Create a request with the given arguments.
    #[must_use]
    pub fn with_arguments(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// `tools/call` parameters for this request.
    #[must_use]
    pub fn to_params(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "arguments": self.arguments,
        })
    }
}

/// One item of a response envelope.
///
/// Kept as an open record: only the discriminator and the text payload are
/// interpreted, everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Item kind (`text`, `image`, `resource`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text payload, present on `text` items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ContentItem {
    /// Create a text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            rest: Map::new(),
        }
    }

    /// The text payload, if this is a text item.
    #[must_use]
    pub fn text_payload(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }

    /// JSON form of the item, used when a non-text item has to be surfaced.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.rest.clone();
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        if let Some(text) = &self.text {
            object.insert("text".to_string(), Value::String(text.clone()));
        }
        Value::Object(object)
    }
}

/// The result of a successful `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Content items; the first one is authoritative.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Set by the remote when the tool itself failed.
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ResponseEnvelope {
    /// Envelope with a single text item.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    /// Read an envelope out of a `tools/call` result.
    ///
    /// Unreadable results produce an empty envelope; the extractor reports
    /// those as `Empty`.
    #[must_use]
    pub fn from_result(result: Value) -> Self {
        match serde_json::from_value(result) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Unreadable tool result, treating as empty: {e}");
                Self::default()
            }
        }
    }

    /// First content item.
    #[must_use]
    pub fn first(&self) -> Option<&ContentItem> {
        self.content.first()
    }
}

/// A tool advertised by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Argument schema, if advertised.
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolInfo {
    /// Read the tool list out of a `tools/list` result, skipping unreadable entries.
    #[must_use]
    pub fn list_from_result(result: &Value) -> Vec<Self> {
        result
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| serde_json::from_value(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_call_result() {
        let envelope = ResponseEnvelope::from_result(json!({
            "content": [
                { "type": "text", "text": "[]" },
                { "type": "image", "data": "AAAA", "mimeType": "image/png" }
            ]
        }));
        assert_eq!(envelope.content.len(), 2);
        assert!(!envelope.is_error);
        assert_eq!(envelope.content[0].text_payload(), Some("[]"));
        assert_eq!(envelope.content[1].text_payload(), None);
        assert_eq!(envelope.content[1].rest["mimeType"], "image/png");
    }

    #[test]
    fn test_unreadable_result_is_empty() {
        let envelope = ResponseEnvelope::from_result(json!({ "content": "nope" }));
        assert!(envelope.content.is_empty());
    }

    #[test]
    fn test_non_text_item_to_value() {
        let item: ContentItem =
            serde_json::from_value(json!({ "type": "resource", "uri": "x://y" })).unwrap();
        assert_eq!(item.to_value(), json!({ "type": "resource", "uri": "x://y" }));
    }

    #[test]
    fn test_request_params() {
        let request = InvocationRequest::new("get_call").arg("callId", "c1");
        assert_eq!(
            request.to_params(),
            json!({ "name": "get_call", "arguments": { "callId": "c1" } })
        );
    }

    #[test]
    fn test_tool_list_skips_bad_entries() {
        let tools = ToolInfo::list_from_result(&json!({
            "tools": [
                { "name": "list_calls", "description": "Lists calls" },
                { "description": "no name" },
                { "name": "get_call" }
            ]
        }));
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["list_calls", "get_call"]);
        assert_eq!(tools[1].description, None);
    }
}
