//! Inbound event types.
//!
//! Events are decoded into a tagged union: resource events are routed by
//! path, external-sync events carry a request from a remote peer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `meta_object.type` that marks an external-sync envelope.
pub const EXTSYNC_META_TYPE: &str = "extsync";

/// URI of requests addressed to the application's own internal endpoint.
pub const INTERNAL_EXTSYNC_URI: &str = "extsync/";

/// URI of the editor console channel, never delivered to handlers.
pub const CONSOLE_EXTSYNC_URI: &str = "extsync/wappsto/editor/console";

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Direct,
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Direct => "direct",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type information attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaObject {
    /// Declared type (`state`, `notification`, `extsync`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// An event about a resource or service, routed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Hierarchical path of the affected resource. May be empty.
    #[serde(default)]
    pub path: String,
    /// What happened.
    pub event: EventKind,
    /// Server timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extsync: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_object: Option<MetaObject>,
}

impl ResourceEvent {
    /// Declared type from `meta_object`, if any.
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.meta_object.as_ref().map(|m| m.kind.as_str())
    }

    /// Whether this event is an external-sync envelope.
    #[must_use]
    pub fn is_extsync(&self) -> bool {
        self.declared_type() == Some(EXTSYNC_META_TYPE)
    }
}

/// A request from a remote peer, delivered through the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRequest {
    /// Identifier of the request. Responses are keyed by it.
    pub id: String,
    /// Target URI.
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Request body. String bodies holding JSON are decoded.
    #[serde(default)]
    pub body: Value,
}

impl ExternalRequest {
    /// Whether the request targets the internal endpoint.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.uri == INTERNAL_EXTSYNC_URI
    }

    /// Whether the request belongs to the editor console channel.
    #[must_use]
    pub fn is_console(&self) -> bool {
        self.uri == CONSOLE_EXTSYNC_URI
    }
}

/// An external-sync envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtSyncEvent {
    pub path: String,
    pub event: EventKind,
    pub timestamp: String,
    pub request: ExternalRequest,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    Resource(ResourceEvent),
    ExtSync(ExtSyncEvent),
}

impl StreamEvent {
    /// Path the event was published under.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            StreamEvent::Resource(e) => &e.path,
            StreamEvent::ExtSync(e) => &e.path,
        }
    }

    /// Event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Resource(e) => e.event,
            StreamEvent::ExtSync(e) => e.event,
        }
    }

    /// The external request, if this is an external-sync envelope.
    #[must_use]
    pub fn as_request(&self) -> Option<&ExternalRequest> {
        match self {
            StreamEvent::ExtSync(e) => Some(&e.request),
            StreamEvent::Resource(_) => None,
        }
    }
}
