//! Codec for control frames and inbound events.
//!
//! Outbound frames are JSON-RPC envelopes encoded as text. Inbound frames are
//! either a control acknowledgement, a single event object or a batch of them.
//! Each event in a batch is validated on its own, so one malformed event does
//! not poison the others.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::envelope::{RpcReply, RpcRequest};
use crate::events::{ExtSyncEvent, ExternalRequest, ResourceEvent, StreamEvent};

/// Maximum inbound frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is empty.
    #[error("Empty frame")]
    Empty,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame or event has an unexpected shape.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// Acknowledgement of a control frame.
    Reply(RpcReply),
    /// One or more events, each decoded independently.
    Events(Vec<Result<StreamEvent, ProtocolError>>),
}

/// Encode a control frame to its text form.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(request: &RpcRequest) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(request)?)
}

/// Decode an inbound frame.
///
/// # Errors
///
/// Returns an error if the frame is empty, too large, not JSON, or neither an
/// acknowledgement, an event object nor an array.
pub fn decode(data: &[u8]) -> Result<Inbound, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    match serde_json::from_slice::<Value>(data)? {
        Value::Object(map) if map.contains_key("jsonrpc") => {
            let reply = RpcReply::deserialize(Value::Object(map))?;
            Ok(Inbound::Reply(reply))
        }
        Value::Array(items) => Ok(Inbound::Events(
            items.into_iter().map(decode_event).collect(),
        )),
        value @ Value::Object(_) => Ok(Inbound::Events(vec![decode_event(value)])),
        other => Err(ProtocolError::Invalid(format!(
            "expected object or array, got {}",
            json_type(&other)
        ))),
    }
}

/// Decode a single event value.
///
/// # Errors
///
/// Returns an error if the value is not a well-formed resource event, or if it
/// is marked as external-sync but its nested request is malformed.
pub fn decode_event(value: Value) -> Result<StreamEvent, ProtocolError> {
    if !value.is_object() {
        return Err(ProtocolError::Invalid(format!(
            "event must be an object, got {}",
            json_type(&value)
        )));
    }

    let event = ResourceEvent::deserialize(value)?;
    if !event.is_extsync() {
        return Ok(StreamEvent::Resource(event));
    }

    let payload = event
        .extsync
        .clone()
        .or_else(|| event.data.clone())
        .ok_or_else(|| ProtocolError::Invalid("extsync event without payload".into()))?;

    Ok(StreamEvent::ExtSync(ExtSyncEvent {
        path: event.path,
        event: event.event,
        timestamp: event.timestamp,
        request: decode_request(payload)?,
    }))
}

#[derive(Deserialize)]
struct RequestMeta {
    id: String,
}

#[derive(Deserialize)]
struct RawRequest {
    meta: RequestMeta,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<Value>,
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    body: Value,
}

fn decode_request(payload: Value) -> Result<ExternalRequest, ProtocolError> {
    let raw = RawRequest::deserialize(payload)?;

    let body = match raw.body {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    };

    Ok(ExternalRequest {
        id: raw.meta.id,
        uri: raw.uri,
        method: raw.method,
        headers: raw.headers,
        query: raw.query,
        body,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build an event object, mostly useful in tests and tools.
#[must_use]
pub fn event_object(path: &str, kind: &str, data: Option<Value>) -> Value {
    let mut map = Map::new();
    map.insert("path".into(), Value::String(path.into()));
    map.insert("event".into(), Value::String(kind.into()));
    map.insert("timestamp".into(), Value::String("1970-01-01T00:00:00Z".into()));
    if let Some(data) = data {
        map.insert("data".into(), data);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    const STATE: &str =
        "/value/6c06b63e-5e3a-4b9d-9c8b-2a1f1d7e3c11/state/cda4d978-39e9-47bf-8497-9813b0f94973";

    fn events(inbound: Inbound) -> Vec<Result<StreamEvent, ProtocolError>> {
        match inbound {
            Inbound::Events(events) => events,
            Inbound::Reply(reply) => panic!("Expected events, got reply {:?}", reply),
        }
    }

    #[test]
    fn test_decode_single_event() {
        let frame = event_object(STATE, "update", Some(json!({"data": "1"}))).to_string();
        let decoded = events(decode(frame.as_bytes()).unwrap());

        assert_eq!(decoded.len(), 1);
        match decoded.into_iter().next().unwrap().unwrap() {
            StreamEvent::Resource(event) => {
                assert_eq!(event.path, STATE);
                assert_eq!(event.event, EventKind::Update);
                assert_eq!(event.data, Some(json!({"data": "1"})));
            }
            other => panic!("Expected resource event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_batch_keeps_good_events() {
        let frame = json!([
            event_object("/network", "create", None),
            {"path": "/network", "event": "explode", "timestamp": "t"},
            event_object("/device", "delete", None),
        ])
        .to_string();

        let decoded = events(decode(frame.as_bytes()).unwrap());
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert!(decoded[1].is_err());
        assert!(decoded[2].is_ok());
    }

    #[test]
    fn test_decode_reply() {
        let frame = br#"{"jsonrpc":"2.0","id":12,"result":{"value":true}}"#;
        match decode(frame).unwrap() {
            Inbound::Reply(reply) => assert!(reply.is_success()),
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode(b""), Err(ProtocolError::Empty)));
        assert!(matches!(decode(b"42"), Err(ProtocolError::Invalid(_))));
    }

    #[test]
    fn test_decode_missing_timestamp_fails_closed() {
        let frame = br#"{"path":"/network","event":"update"}"#;
        let decoded = events(decode(frame).unwrap());
        assert!(decoded[0].is_err());
    }

    #[test]
    fn test_decode_extsync_request() {
        let frame = json!({
            "path": "/extsync/request",
            "event": "create",
            "timestamp": "2024-01-01T00:00:00Z",
            "meta_object": {"type": "extsync"},
            "extsync": {
                "meta": {"id": "b2a1c9f4-0000-4000-8000-000000000001"},
                "uri": "extsync/",
                "method": "POST",
                "body": "{\"action\":\"toggle\"}"
            }
        })
        .to_string();

        let decoded = events(decode(frame.as_bytes()).unwrap());
        let request = match decoded.into_iter().next().unwrap().unwrap() {
            StreamEvent::ExtSync(event) => event.request,
            other => panic!("Expected extsync event, got {:?}", other),
        };

        assert_eq!(request.id, "b2a1c9f4-0000-4000-8000-000000000001");
        assert!(request.is_internal());
        assert_eq!(request.method.as_deref(), Some("POST"));
        assert_eq!(request.body, json!({"action": "toggle"}));
    }

    #[test]
    fn test_decode_extsync_payload_from_data() {
        let frame = json!({
            "path": "/extsync/request",
            "event": "create",
            "timestamp": "t",
            "meta_object": {"type": "extsync"},
            "data": {"meta": {"id": "r-9"}, "uri": "extsync/hook", "body": "plain text"}
        })
        .to_string();

        let decoded = events(decode(frame.as_bytes()).unwrap());
        let event = decoded.into_iter().next().unwrap().unwrap();
        let request = event.as_request().unwrap();
        assert_eq!(request.id, "r-9");
        assert_eq!(request.body, json!("plain text"));
    }

    #[test]
    fn test_decode_extsync_without_id_fails_closed() {
        let frame = json!({
            "path": "/extsync/request",
            "event": "create",
            "timestamp": "t",
            "meta_object": {"type": "extsync"},
            "extsync": {"uri": "extsync/"}
        })
        .to_string();

        let decoded = events(decode(frame.as_bytes()).unwrap());
        assert!(decoded[0].is_err());
    }

    #[test]
    fn test_frame_too_large() {
        let large = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(decode(&large), Err(ProtocolError::FrameTooLarge(_))));
    }
}
