//! # iotstream-core
//!
//! Client side of the iotstream event channel.
//!
//! This crate provides the building blocks:
//!
//! - **Registry** - which paths, channels and signals are subscribed, and who listens
//! - **Router** - classifies inbound events and dispatches them to listeners
//! - **Connection** - one socket, open-timeout, exponential backoff, subscription replay
//! - **ExtSync** - request/response correlation with a remote peer
//! - **Stream** - the composition root tying the above together
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  subscribe  ┌─────────────┐  frames  ┌─────────────┐
//! │   Stream    │────────────▶│ Connection  │─────────▶│   Router    │
//! └─────────────┘             └─────────────┘          └─────────────┘
//!        │                                                    │
//!        ▼                                                    ▼
//! ┌─────────────┐                                     ┌─────────────┐
//! │  Registry   │◀────────────── listeners ───────────│   ExtSync   │
//! └─────────────┘                                     └─────────────┘
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod extsync;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use config::StreamConfig;
pub use connection::{ConnectionHandler, ConnectionManager, ConnectionState};
pub use error::StreamError;
pub use extsync::{request_fn, HandlerError, Reply, RequestHandler, EXTSYNC_REQUEST_CHANNEL};
pub use handler::{
    channel_fn, ChannelHandler, HandlerOutcome, Signal, SignalHandler, SignalKind, StreamModel,
};
pub use registry::{HandlerId, RegistryStats, SubscriptionRegistry};
pub use router::{MessageRouter, RouteSummary};
pub use stream::Stream;

pub use iotstream_protocol::{EventKind, ExternalRequest, ResourceEvent, StreamEvent};
