//! Stream errors.

use iotstream_protocol::ProtocolError;
use iotstream_transport::TransportError;
use thiserror::Error;

/// Errors returned by stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream was closed by the caller.
    #[error("Stream closed")]
    Closed,

    /// No socket is currently open.
    #[error("Not connected")]
    NotConnected,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
