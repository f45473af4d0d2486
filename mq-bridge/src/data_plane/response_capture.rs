//! Captures a webhook response body for the audit record.

use serde_json::{json, Value};

#[derive(Debug, PartialEq)]
pub(crate) enum CapturedResponse {
    /// Object-shaped JSON, kept as parsed.
    Structured(Value),
    /// Anything else, wrapped as `{"raw": <text>}`.
    Raw(Value),
}

impl CapturedResponse {
    pub(crate) fn into_value(self) -> Value {
        match self {
            CapturedResponse::Structured(value) | CapturedResponse::Raw(value) => value,
        }
    }
}

pub(crate) fn capture_response(body: &[u8]) -> CapturedResponse {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => CapturedResponse::Structured(value),
        _ => CapturedResponse::Raw(json!({ "raw": String::from_utf8_lossy(body) })),
    }
}
