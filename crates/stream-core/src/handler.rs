//! Listener contracts.
//!
//! Three kinds of listeners can be registered:
//!
//! - [`StreamModel`] - a resource that knows its own path and receives
//!   resource events addressed to it.
//! - [`ChannelHandler`] - a service handler on a named channel. It returns a
//!   [`HandlerOutcome`] to stay registered or to unsubscribe itself.
//! - [`SignalHandler`] - a connection-level signal (`error`, `close`).

use async_trait::async_trait;
use iotstream_protocol::{ResourceEvent, StreamEvent};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// What a channel handler wants after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerOutcome {
    /// Stay registered.
    Continue,
    /// Remove this handler from the channel.
    Unsubscribe,
}

/// A resource model that receives events for its own path.
#[async_trait]
pub trait StreamModel: Send + Sync {
    /// Path of the resource, e.g. `/state/<id>`.
    ///
    /// May be empty until the resource has been assigned an identifier.
    fn path(&self) -> String;

    /// Handle an event addressed to this resource.
    async fn handle_stream(&self, event: &ResourceEvent);
}

/// A handler registered on a named channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Handle an event delivered on the channel.
    async fn handle(&self, event: &StreamEvent) -> HandlerOutcome;
}

/// Channel handler backed by an async closure.
pub struct FnChannelHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ChannelHandler for FnChannelHandler<F>
where
    F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    async fn handle(&self, event: &StreamEvent) -> HandlerOutcome {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as a channel handler.
pub fn channel_fn<F, Fut>(f: F) -> Arc<dyn ChannelHandler>
where
    F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    Arc::new(FnChannelHandler { f })
}

/// Kinds of connection-level signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Error,
    Close,
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(SignalKind::Error),
            "close" => Ok(SignalKind::Close),
            other => Err(format!("unknown signal '{}'", other)),
        }
    }
}

/// A connection-level signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A transport error occurred.
    Error(String),
    /// The connection closed without being asked to.
    Close,
}

impl Signal {
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Error(_) => SignalKind::Error,
            Signal::Close => SignalKind::Close,
        }
    }
}

/// A handler for connection-level signals.
pub trait SignalHandler: Send + Sync {
    fn on_signal(&self, signal: &Signal);
}

impl<F> SignalHandler for F
where
    F: Fn(&Signal) + Send + Sync,
{
    fn on_signal(&self, signal: &Signal) {
        self(signal)
    }
}

/// Text of a caught listener panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "listener panicked".to_string())
}
