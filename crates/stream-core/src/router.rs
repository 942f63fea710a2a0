//! Inbound frame routing.
//!
//! Frames are decoded and their events dispatched strictly in arrival order.
//! Resource events go to the models keyed by the tail of their path, then to
//! the channel handlers named by their non-UUID path segments. External-sync
//! events go to the request channel.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::FutureExt;
use iotstream_protocol::codec::{self, Inbound};
use iotstream_protocol::{path, ResourceEvent, RpcReply, StreamEvent};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::connection::ConnectionHandler;
use crate::extsync::EXTSYNC_REQUEST_CHANNEL;
use crate::handler::{panic_message, ChannelHandler, HandlerOutcome, Signal};
use crate::metrics;
use crate::registry::{HandlerId, SubscriptionRegistry};

/// What routing one frame did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    /// Events decoded from the frame.
    pub events: usize,
    /// Events that failed to decode.
    pub rejected: usize,
    /// Listener invocations.
    pub deliveries: usize,
    /// Channel handlers removed because they asked to be.
    pub unsubscribed: usize,
}

/// Dispatches inbound frames to registered listeners.
pub struct MessageRouter {
    registry: Arc<SubscriptionRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Decode a frame and dispatch every event it carries.
    ///
    /// Malformed frames are dropped. In a batch, a malformed event is skipped
    /// and the others are still dispatched.
    pub async fn route(&self, frame: &[u8]) -> RouteSummary {
        let mut summary = RouteSummary::default();

        let inbound = match codec::decode(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping malformed frame");
                metrics::record_decode_error();
                return summary;
            }
        };

        match inbound {
            Inbound::Reply(reply) => log_reply(&reply),
            Inbound::Events(events) => {
                for event in events {
                    match event {
                        Ok(event) => {
                            summary.events += 1;
                            self.dispatch(&event, &mut summary).await;
                        }
                        Err(e) => {
                            summary.rejected += 1;
                            warn!(error = %e, "Dropping malformed event");
                            metrics::record_decode_error();
                        }
                    }
                }
            }
        }

        summary
    }

    async fn dispatch(&self, event: &StreamEvent, summary: &mut RouteSummary) {
        metrics::record_event(event.kind().as_str());

        match event {
            StreamEvent::ExtSync(ext) => {
                if ext.request.is_console() {
                    trace!(request = %ext.request.id, "Dropping console request");
                    return;
                }
                self.dispatch_channels(&[EXTSYNC_REQUEST_CHANNEL.to_string()], event, summary)
                    .await;
            }
            StreamEvent::Resource(resource) => {
                let keys = path::routing_keys(&resource.path);
                for model in self.registry.models_for(&keys) {
                    let delivery = AssertUnwindSafe(model.handle_stream(resource)).catch_unwind();
                    if let Err(payload) = delivery.await {
                        warn!(
                            path = %resource.path,
                            error = %panic_message(payload.as_ref()),
                            "Model panicked while handling event"
                        );
                    }
                    summary.deliveries += 1;
                }
                self.dispatch_channels(&channel_candidates(resource), event, summary)
                    .await;
            }
        }
    }

    /// Run every handler of the given channels concurrently, then drop the
    /// ones that asked to unsubscribe. A handler that panics stays registered.
    async fn dispatch_channels(
        &self,
        channels: &[String],
        event: &StreamEvent,
        summary: &mut RouteSummary,
    ) {
        let targets: Vec<(&str, HandlerId, Arc<dyn ChannelHandler>)> = channels
            .iter()
            .flat_map(|channel| {
                self.registry
                    .channel_handlers(channel)
                    .into_iter()
                    .map(move |(id, handler)| (channel.as_str(), id, handler))
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let outcomes = join_all(targets.iter().map(|(channel, _, handler)| async move {
            AssertUnwindSafe(handler.handle(event))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    warn!(
                        channel = %channel,
                        error = %panic_message(payload.as_ref()),
                        "Channel handler panicked"
                    );
                    HandlerOutcome::Continue
                })
        }))
        .await;

        for ((channel, id, _), outcome) in targets.iter().zip(outcomes) {
            summary.deliveries += 1;
            if outcome == HandlerOutcome::Unsubscribe
                && self.registry.remove_channel_handler(channel, *id)
            {
                summary.unsubscribed += 1;
            }
        }
    }
}

/// Channels an event is published on. Path-less events use their declared type.
fn channel_candidates(event: &ResourceEvent) -> Vec<String> {
    if path::segments(&event.path).is_empty() {
        event
            .declared_type()
            .map(|kind| vec![path::normalize_channel(kind)])
            .unwrap_or_default()
    } else {
        path::channel_keys(&event.path)
    }
}

fn log_reply(reply: &RpcReply) {
    if reply.is_success() {
        debug!(id = ?reply.id, value = ?reply.value(), "Control frame acknowledged");
    } else {
        warn!(id = ?reply.id, error = ?reply.error, "Control frame rejected");
    }
}

#[async_trait]
impl ConnectionHandler for MessageRouter {
    async fn on_frame(&self, frame: Bytes) {
        let summary = self.route(&frame).await;
        trace!(?summary, "Frame routed");
    }

    fn on_signal(&self, signal: Signal) {
        for handler in self.registry.signal_handlers(signal.kind()) {
            let delivery = panic::catch_unwind(AssertUnwindSafe(|| handler.on_signal(&signal)));
            if let Err(payload) = delivery {
                warn!(error = %panic_message(payload.as_ref()), "Signal handler panicked");
            }
        }
    }

    fn subscriptions(&self) -> Vec<String> {
        self.registry.subscriptions()
    }
}
