//! Transport abstraction traits for iotstream.
//!
//! The connection manager only talks to these traits, so the socket handle it
//! owns can be replaced wholesale on every reconnect and swapped for an
//! in-memory double in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for one socket. A reconnect always gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to establish the connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Control-plane request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] iotstream_protocol::ProtocolError),
}

/// An open event-channel connection.
pub struct Connection {
    /// Identifier of this socket.
    pub id: ConnectionId,
    /// Write half.
    pub sink: Box<dyn ConnectionSink>,
    /// Read half.
    pub stream: Box<dyn ConnectionStream>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

/// A transport that can open event-channel connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// Write half of a connection.
#[async_trait]
pub trait ConnectionSink: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait ConnectionStream: Send {
    /// Receive the next data frame.
    ///
    /// Returns `None` once the connection is closed. An `Err` item reports a
    /// transport error; the stream may still yield further frames afterwards.
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>>;
}

/// Plain request/response calls to the remote API.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// `POST` a JSON body to `path` and return the decoded reply.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError>;

    /// `PATCH` a JSON body to `path` and return the decoded reply.
    async fn patch(&self, path: &str, body: &Value) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_str() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.to_string(), "test-id");
    }
}
