//! Event decoding.
//!
//! Subscription and alarm messages share one shape and differ only in the
//! top-level key:
//!
//! ```json
//! {"data": {
//!     "uri": "vehicle/data/EngineSpeed",
//!     "timestamp": "2024-01-17T10:00:00Z",
//!     "short_name": "EngineSpeed~sub",
//!     "EngineSpeed": {"value": 2500.0, "timestamp": "2024-01-17T10:00:00Z"}
//! }}
//! ```
//!
//! Anything else on the channel is not an event. Decoding never panics;
//! callers are expected to drop frames that fail to decode.

use serde_json::{Map, Value};
use thiserror::Error;
use wva_core::path::last_segment;
use wva_core::{parse_timestamp, Event, EventKind, VehicleResponse};

use crate::codec::Frame;

/// Why a frame could not be decoded into an [`Event`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Neither a "data" nor an "alarm" object is present.
    #[error("Frame is neither a subscription nor an alarm message")]
    NotAnEvent,

    /// A required field is absent.
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// A field is present but has the wrong JSON type.
    #[error("Field '{field}' should be {expected}")]
    WrongType { field: String, expected: &'static str },

    /// A timestamp could not be parsed as ISO 8601.
    #[error("Invalid timestamp '{0}'")]
    BadTimestamp(String),
}

/// Decode a frame into an event, or `None` if it is not a well-formed event.
pub fn decode_event(frame: &Frame) -> Option<Event> {
    try_decode_event(frame).ok()
}

/// Decode a frame into an event, reporting why decoding failed.
pub fn try_decode_event(frame: &Frame) -> Result<Event, DecodeError> {
    let (kind, inner) = if let Some(Value::Object(inner)) = frame.get("data") {
        (EventKind::Subscription, inner)
    } else if let Some(Value::Object(inner)) = frame.get("alarm") {
        (EventKind::Alarm, inner)
    } else {
        return Err(DecodeError::NotAnEvent);
    };

    let uri = get_str(inner, "uri")?;
    let endpoint = last_segment(uri);
    let sent_at = get_timestamp(inner, "timestamp")?;
    let short_name = get_str(inner, "short_name")?;
    let body = inner
        .get(endpoint)
        .ok_or_else(|| DecodeError::MissingField(endpoint.to_string()))?;
    let response = decode_vehicle_response(body)?;

    Ok(Event {
        kind,
        endpoint: endpoint.to_string(),
        short_name: short_name.to_string(),
        sent_at,
        response,
    })
}

/// Decode `{"value": <number>, "timestamp": "<ISO 8601>"}`.
///
/// Numeric strings are accepted for the value, as some firmware quotes them.
pub fn decode_vehicle_response(body: &Value) -> Result<VehicleResponse, DecodeError> {
    let body = body.as_object().ok_or_else(|| DecodeError::WrongType {
        field: "response".to_string(),
        expected: "an object",
    })?;

    let value = match body.get("value") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(DecodeError::MissingField("value".to_string())),
    }
    .ok_or_else(|| DecodeError::WrongType {
        field: "value".to_string(),
        expected: "a number",
    })?;

    let time = get_timestamp(body, "timestamp")?;
    Ok(VehicleResponse::new(value, time))
}

fn get_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, DecodeError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "a string",
        }),
        None => Err(DecodeError::MissingField(field.to_string())),
    }
}

fn get_timestamp(
    object: &Map<String, Value>,
    field: &str,
) -> Result<chrono::DateTime<chrono::Utc>, DecodeError> {
    let text = get_str(object, field)?;
    parse_timestamp(text).ok_or_else(|| DecodeError::BadTimestamp(text.to_string()))
}
