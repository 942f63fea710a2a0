//! JSON-RPC control envelopes.
//!
//! Control frames are fire-and-forget: the `id` only tells frames apart on the
//! wire and is never matched against a stored waiter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC protocol version carried by every control frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Upper bound (inclusive) for generated request ids.
const MAX_REQUEST_ID: u32 = 1_000_000;

/// Generate a random control frame id.
#[must_use]
pub fn generate_request_id() -> u32 {
    rand::thread_rng().gen_range(1..=MAX_REQUEST_ID)
}

/// HTTP-style method of a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Add a single subscription.
    Post,
    /// Replace the subscription set of the open stream.
    Patch,
}

/// Parameters of a control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcParams {
    /// Target URL on the server.
    pub url: String,
    /// Optional body.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

/// An outbound control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Method.
    pub method: Method,
    /// Random frame id.
    pub id: u32,
    /// Parameters.
    pub params: RpcParams,
}

impl RpcRequest {
    /// Create a new control frame with a fresh random id.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            id: generate_request_id(),
            params: RpcParams {
                url: url.into(),
                data,
            },
        }
    }

    /// Subscribe to a single path or channel.
    #[must_use]
    pub fn subscribe(url: impl Into<String>, subscription: &str) -> Self {
        Self::new(
            Method::Post,
            url,
            Some(Value::String(subscription.to_string())),
        )
    }

    /// Replay the full subscription set in one frame.
    #[must_use]
    pub fn resubscribe(url: impl Into<String>, subscriptions: &[String]) -> Self {
        Self::new(
            Method::Patch,
            url,
            Some(json!({ "subscription": subscriptions })),
        )
    }
}

/// An inbound control acknowledgement.
///
/// Never carries an application event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    /// Protocol version echoed by the server.
    pub jsonrpc: String,
    /// Id of the acknowledged frame, if echoed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Success payload, usually `{"value": ...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcReply {
    /// Whether the server accepted the control frame.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The `result.value` field, if present.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.get("value"))
    }
}
