//! # iotstream-transport
//!
//! Transport layer for the iotstream event channel.
//!
//! - **Event channel** - a [`Transport`] opens one full-duplex
//!   [`Connection`], split into a [`ConnectionSink`] for control frames and a
//!   [`ConnectionStream`] for inbound frames. The default implementation is
//!   WebSocket over tokio-tungstenite.
//! - **Control plane** - plain request/response calls (`POST`/`PATCH`) used by
//!   the external-sync exchange, behind the [`ControlPlane`] trait.
//!
//! ```rust,ignore
//! use iotstream_transport::{Endpoint, Transport, WebSocketTransport};
//!
//! let endpoint = Endpoint::new("https://example.com/services", "2.1", "session")?;
//! let transport = WebSocketTransport::default();
//! let mut conn = transport.connect(endpoint.stream_url().as_str()).await?;
//! while let Some(Ok(frame)) = conn.stream.recv().await {
//!     // Decode and route the frame
//! }
//! ```

pub mod endpoint;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::Endpoint;
pub use traits::{
    Connection, ConnectionId, ConnectionSink, ConnectionStream, ControlPlane, Transport,
    TransportError,
};

#[cfg(feature = "http")]
pub use http::HttpControlPlane;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
