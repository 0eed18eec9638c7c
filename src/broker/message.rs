//! Wire envelope for cross-origin messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every message posted or received by the broker.
///
/// `requestId` is present on requests and their responses; a response
/// carries either `payload` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Fire-and-forget event.
    pub fn event(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            request_id: None,
            payload,
            error: None,
        }
    }

    pub(crate) fn request(kind: &str, request_id: &str, payload: Value) -> Self {
        Self {
            request_id: Some(request_id.to_string()),
            ..Self::event(kind, payload)
        }
    }

    /// Answer to `request`, echoing its type and requestId.
    pub fn reply_to(request: &Envelope, result: Result<Value, String>) -> Self {
        let (payload, error) = match result {
            Ok(payload) => (payload, None),
            Err(error) => (Value::Null, Some(error)),
        };
        Self {
            kind: request.kind.clone(),
            request_id: request.request_id.clone(),
            payload,
            error,
        }
    }

    /// Parse untrusted inbound data. Anything without a string `type` is rejected.
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A message as delivered by the embedding context, with the sender's origin
/// as reported by the platform (never taken from the payload).
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}
