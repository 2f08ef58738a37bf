//! Decoding of inbound request payloads.
//!
//! Decoding is tolerant in the same places the wire format is loose:
//! unknown top-level keys and unknown supply items are ignored, numeric
//! fields accept floats (truncated toward zero), and non-numeric supply
//! values are skipped. A payload is only rejected when it is not a JSON
//! object or lacks a string `message` field.

use refuge_core::SupplyDelta;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::{names, Command, Request};

/// Errors produced while decoding or encoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {0} has the wrong type")]
    InvalidField(&'static str),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl ParseError {
    /// Returns true if the payload was well-formed JSON but not a valid request.
    pub fn is_well_formed_json(&self) -> bool {
        matches!(
            self,
            Self::NotAnObject | Self::MissingField(_) | Self::InvalidField(_)
        )
    }
}

/// Decodes one request payload.
///
/// # Errors
///
/// Returns a `ParseError` if the payload is not a UTF-8 JSON object with a
/// string `message` field.
pub fn decode_request(payload: &[u8]) -> Result<Request, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let value: Value =
        serde_json::from_str(text.trim_end_matches('\0')).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let message = object
        .get("message")
        .ok_or(ParseError::MissingField("message"))?
        .as_str()
        .ok_or(ParseError::InvalidField("message"))?;

    let hostname = object
        .get("hostname")
        .and_then(Value::as_str)
        .map(str::to_string);

    let command = match message {
        names::AUTHENTICATE => Command::Authenticate,
        names::STATUS => Command::Status,
        names::UPDATE => Command::Update(decode_delta(object)),
        names::SUMMARY => Command::Summary,
        other => Command::Unknown(other.to_string()),
    };

    Ok(Request { command, hostname })
}

/// Collects the numeric fields of the `food` and `medicine` objects.
fn decode_delta(object: &Map<String, Value>) -> SupplyDelta {
    let mut delta = SupplyDelta::default();

    for category in ["food", "medicine"] {
        let Some(items) = object.get(category).and_then(Value::as_object) else {
            continue;
        };
        for (item, value) in items {
            if let Some(amount) = numeric_value(value) {
                // Unknown items are ignored
                let _ = delta.set(category, item, amount);
            }
        }
    }

    delta
}

fn numeric_value(value: &Value) -> Option<i64> {
    // `as i64` saturates for out-of-range floats
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}
