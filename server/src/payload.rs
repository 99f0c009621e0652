//! Request payloads as delivered to the handler, and their normalization
//! into the single text string the model consumes.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::HandlerError;

/// One field of an inference request. The same field may carry plain
/// text, raw bytes or a nested mapping depending on the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, PayloadValue>),
    /// Numbers, booleans and arrays from a JSON body.
    Other(Value),
}

impl PayloadValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }

    /// Emptiness in the loose sense used for the `data`/`body` fallback.
    fn is_truthy(&self) -> bool {
        match self {
            PayloadValue::Null => false,
            PayloadValue::Text(s) => !s.is_empty(),
            PayloadValue::Bytes(b) => !b.is_empty(),
            PayloadValue::Map(m) => !m.is_empty(),
            PayloadValue::Other(v) => match v {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
                Value::Array(a) => !a.is_empty(),
                _ => true,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PayloadValue::Null => Value::Null,
            PayloadValue::Text(s) => Value::String(s.clone()),
            PayloadValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            PayloadValue::Map(m) => Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            PayloadValue::Other(v) => v.clone(),
        }
    }
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PayloadValue::Null,
            Value::String(s) => PayloadValue::Text(s),
            Value::Object(o) => {
                PayloadValue::Map(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            other => PayloadValue::Other(other),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(b: Vec<u8>) -> Self {
        PayloadValue::Bytes(b)
    }
}

/// A single inference request: named fields with loosely typed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceRequest {
    fields: BTreeMap<String, PayloadValue>,
}

impl InferenceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<PayloadValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&PayloadValue> {
        self.fields.get(name)
    }

    /// Wrap an HTTP body under the `body` field. JSON bodies are parsed;
    /// anything else (or malformed JSON) stays raw bytes.
    pub fn from_http_body(content_type: Option<&str>, body: &[u8]) -> Self {
        let is_json = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false);

        let value = if is_json {
            serde_json::from_slice::<Value>(body)
                .map(PayloadValue::from)
                .unwrap_or_else(|_| PayloadValue::Bytes(body.to_vec()))
        } else {
            PayloadValue::Bytes(body.to_vec())
        };

        Self::new().with_field("body", value)
    }
}

/// Resolve the text to synthesize from the first request of a batch.
pub fn extract_text(requests: &[InferenceRequest]) -> Result<String, HandlerError> {
    let request = requests
        .first()
        .ok_or_else(|| HandlerError::InvalidInput("No requests provided.".to_string()))?;

    let value = request
        .field("data")
        .filter(|v| v.is_truthy())
        .or_else(|| request.field("body"))
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            HandlerError::InvalidInput(
                "Request payload must contain a 'data' or 'body' key with a non-empty value."
                    .to_string(),
            )
        })?;

    // One level of nesting: {"data": "..."} delivered as the body itself.
    let value = match value {
        PayloadValue::Map(map) => map.get("data").unwrap_or(value),
        other => other,
    };

    let text = match value {
        PayloadValue::Null => {
            return Err(HandlerError::InvalidInput(
                "Request payload 'data' value is null.".to_string(),
            ))
        }
        PayloadValue::Text(s) => s.clone(),
        PayloadValue::Bytes(b) => String::from_utf8(b.clone())?,
        PayloadValue::Map(_) => value.to_json().to_string(),
        PayloadValue::Other(v) => v.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(HandlerError::InvalidInput(
            "Request text is empty after trimming whitespace.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
