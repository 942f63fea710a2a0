//! WebSocket transport implementation.
//!
//! This module provides the event-channel client using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::traits::{Connection, ConnectionId, ConnectionSink, ConnectionStream, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: iotstream_protocol::codec::MAX_FRAME_SIZE,
        }
    }
}

/// WebSocket transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let id = ConnectionId::generate();
        info!(connection = %id, "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        Ok(Connection {
            sink: Box::new(WebSocketSink {
                id: id.clone(),
                sink,
                closed: false,
            }),
            stream: Box::new(WebSocketReader {
                id: id.clone(),
                stream,
                max_message_size: self.config.max_message_size,
            }),
            id,
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Write half of a WebSocket connection.
pub struct WebSocketSink {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl ConnectionSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        debug!(connection = %self.id, "Closing WebSocket");
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }
}

/// Read half of a WebSocket connection.
pub struct WebSocketReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
    max_message_size: usize,
}

#[async_trait]
impl ConnectionStream for WebSocketReader {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > self.max_message_size {
                        warn!(
                            connection = %self.id,
                            "Message too large: {} bytes (max: {})",
                            data.len(),
                            self.max_message_size
                        );
                        return Some(Err(TransportError::Protocol(
                            iotstream_protocol::ProtocolError::FrameTooLarge(data.len()),
                        )));
                    }
                    return Some(Ok(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by tungstenite itself
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, ?frame, "Received close frame");
                    return None;
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    return None;
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    return Some(Err(TransportError::ReceiveFailed(e.to_string())));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return None;
                }
            }
        }
    }
}
