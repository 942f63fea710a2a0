//! # iotstream-protocol
//!
//! Wire definitions for the iotstream event channel.
//!
//! The channel carries two kinds of traffic over one WebSocket:
//!
//! - **Control frames** - JSON-RPC 2.0 envelopes sent by the client to
//!   subscribe (`POST`) or to replay subscriptions after a reconnect (`PATCH`),
//!   and the acknowledgements the server answers with.
//! - **Events** - resource events (`create`, `update`, `delete`, `direct`)
//!   addressed by a hierarchical path, and external-sync envelopes carrying
//!   requests from a remote peer.
//!
//! ## Example
//!
//! ```rust
//! use iotstream_protocol::{codec, Inbound, RpcRequest};
//!
//! let request = RpcRequest::subscribe("/services/2.1/websocket/open/subscription", "/network");
//! let text = codec::encode(&request).unwrap();
//! assert!(text.contains("\"jsonrpc\":\"2.0\""));
//!
//! let frame = br#"{"path":"/network/6c06b63e-5e3a-4b9d-9c8b-2a1f1d7e3c11","event":"update","timestamp":"2024-01-01T00:00:00Z"}"#;
//! match codec::decode(frame).unwrap() {
//!     Inbound::Events(events) => assert_eq!(events.len(), 1),
//!     Inbound::Reply(_) => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod envelope;
pub mod events;
pub mod path;

pub use codec::{decode, encode, Inbound, ProtocolError};
pub use envelope::{Method, RpcParams, RpcReply, RpcRequest, JSONRPC_VERSION};
pub use events::{
    EventKind, ExtSyncEvent, ExternalRequest, MetaObject, ResourceEvent, StreamEvent,
};
