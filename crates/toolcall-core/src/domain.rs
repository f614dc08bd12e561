//! Lenient views over the records returned by the remote service.
//!
//! Records arrive as arbitrary JSON. Every field here is optional and
//! unknown fields are kept, so a view never fails to build.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

const NOT_AVAILABLE: &str = "N/A";

fn lenient<T: DeserializeOwned + Default>(value: &Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

/// A field of the wrong type reads as absent instead of failing the record.
fn lenient_field<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A configured voice assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assistant {
    #[serde(default, deserialize_with = "lenient_field")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub name: Option<String>,
    /// Language model settings (`model` on the wire).
    #[serde(default, rename = "model")]
    pub llm_config: Option<Value>,
    /// Voice settings.
    #[serde(default, rename = "voice")]
    pub voice_config: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Assistant {
    /// Build a view over a record.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        lenient(value)
    }

    /// `name (id)` listing line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} ({})",
            self.name.as_deref().unwrap_or(NOT_AVAILABLE),
            self.id.as_deref().unwrap_or(NOT_AVAILABLE)
        )
    }
}

/// A phone number owned by the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    #[serde(default, deserialize_with = "lenient_field")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub phone_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PhoneNumber {
    /// Build a view over a record.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        lenient(value)
    }

    /// `number (id)` listing line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} ({})",
            self.phone_number.as_deref().unwrap_or(NOT_AVAILABLE),
            self.id.as_deref().unwrap_or(NOT_AVAILABLE)
        )
    }
}

/// The party a call is placed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(
        default,
        deserialize_with = "lenient_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Customer {
    /// Customer with an optional phone number.
    #[must_use]
    pub fn new(phone_number: Option<String>) -> Self {
        Self {
            phone_number,
            extra: Map::new(),
        }
    }
}

/// An outbound or inbound call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(default, deserialize_with = "lenient_field")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub customer: Option<Customer>,
    #[serde(default, deserialize_with = "lenient_field")]
    pub ended_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Call {
    /// Build a view over a record.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        lenient(value)
    }

    /// One-line summary with `N/A` for absent fields.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let customer = self
            .customer
            .as_ref()
            .and_then(|c| c.phone_number.as_deref());
        format!(
            "ID: {} | Status: {} | Created: {} | Customer: {} | Ended reason: {}",
            self.id.as_deref().unwrap_or(NOT_AVAILABLE),
            self.status.as_deref().unwrap_or(NOT_AVAILABLE),
            self.created_at.as_deref().unwrap_or(NOT_AVAILABLE),
            customer.unwrap_or(NOT_AVAILABLE),
            self.ended_reason.as_deref().unwrap_or(NOT_AVAILABLE),
        )
    }
}

/// String `id` of a record, if it has one.
#[must_use]
pub fn record_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_assistant_view_keeps_unknown_fields() {
        let assistant = Assistant::from_value(&json!({
            "id": "a1",
            "name": "Support",
            "model": { "provider": "anthropic" },
            "firstMessage": "Hi"
        }));
        assert_eq!(assistant.id.as_deref(), Some("a1"));
        assert_eq!(assistant.llm_config, Some(json!({ "provider": "anthropic" })));
        assert_eq!(assistant.voice_config, None);
        assert_eq!(assistant.extra["firstMessage"], "Hi");
        assert_eq!(assistant.summary_line(), "Support (a1)");
    }

    #[test]
    fn test_unreadable_record_yields_empty_view() {
        let phone = PhoneNumber::from_value(&json!({ "id": 17 }));
        assert_eq!(phone, PhoneNumber::default());
        assert_eq!(PhoneNumber::from_value(&json!("oops")), PhoneNumber::default());
    }

    #[test]
    fn test_mistyped_field_keeps_the_rest() {
        let assistant = Assistant::from_value(&json!({ "id": "a1", "name": 5 }));
        assert_eq!(assistant.summary_line(), "N/A (a1)");

        let call = Call::from_value(&json!({
            "id": "c1",
            "status": "ended",
            "customer": "+15550100",
            "endedReason": null
        }));
        assert_eq!(call.customer, None);
        assert_eq!(
            call.summary_line(),
            "ID: c1 | Status: ended | Created: N/A | Customer: N/A | Ended reason: N/A"
        );
    }

    #[test]
    fn test_call_summary_defaults() {
        let call = Call::from_value(&json!({ "id": "c1", "status": "queued" }));
        assert_eq!(
            call.summary_line(),
            "ID: c1 | Status: queued | Created: N/A | Customer: N/A | Ended reason: N/A"
        );

        let full = Call::from_value(&json!({
            "id": "c2",
            "status": "ended",
            "createdAt": "2025-04-15T15:30:00Z",
            "customer": { "phoneNumber": "+15550100" },
            "endedReason": "customer-ended-call"
        }));
        assert!(full.summary_line().ends_with("Customer: +15550100 | Ended reason: customer-ended-call"));
    }

    #[test]
    fn test_customer_serializes_without_number() {
        assert_eq!(serde_json::to_value(Customer::new(None)).unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(Customer::new(Some("+1234567890".into()))).unwrap(),
            json!({ "phoneNumber": "+1234567890" })
        );
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({ "id": "x" })), Some("x"));
        assert_eq!(record_id(&json!({ "id": 3 })), None);
        assert_eq!(record_id(&json!([])), None);
    }
}
