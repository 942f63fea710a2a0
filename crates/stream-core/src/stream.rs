//! The stream: one shared connection plus the listeners attached to it.

use iotstream_protocol::{path, RpcRequest};
use iotstream_transport::{ControlPlane, Endpoint, HttpControlPlane, Transport, WebSocketTransport};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::StreamError;
use crate::extsync::{Correlator, ExternalRequestListener, RequestHandler, EXTSYNC_REQUEST_CHANNEL};
use crate::handler::{ChannelHandler, SignalHandler, SignalKind, StreamModel};
use crate::metrics;
use crate::registry::{HandlerId, RegistryStats, SubscriptionRegistry};
use crate::router::MessageRouter;

/// Client handle of the event channel.
///
/// Cheap to clone; all clones share one connection. Registration methods
/// open the connection on first use and wait until it is open.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    endpoint: Endpoint,
    registry: Arc<SubscriptionRegistry>,
    connection: Arc<ConnectionManager>,
    correlator: Arc<Correlator>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

impl Stream {
    /// Create a stream over WebSocket with an HTTP control plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        let endpoint = config.endpoint()?;
        let transport = Arc::new(WebSocketTransport::default());
        let control = Arc::new(HttpControlPlane::with_timeout(
            endpoint,
            config.request_timeout,
        )?);
        Self::with_transport(&config, transport, control)
    }

    /// Create a stream over the given transport and control plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_transport(
        config: &StreamConfig,
        transport: Arc<dyn Transport>,
        control: Arc<dyn ControlPlane>,
    ) -> Result<Self, StreamError> {
        let endpoint = config.endpoint()?;
        let registry = Arc::new(SubscriptionRegistry::new());
        let router = Arc::new(MessageRouter::new(registry.clone()));
        let connection = ConnectionManager::new(config, &endpoint, transport, router)?;

        info!(host = %endpoint.host(), version = %endpoint.version(), "Stream created");

        Ok(Self {
            inner: Arc::new(StreamInner {
                endpoint,
                registry,
                connection,
                correlator: Arc::new(Correlator::new(control)),
            }),
        })
    }

    /// Wait until the connection is open.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed meanwhile.
    pub async fn ensure_open(&self) -> Result<(), StreamError> {
        self.inner.connection.ensure_open().await
    }

    /// Register a model and subscribe to its path.
    ///
    /// A model without a path yet is kept aside until
    /// [`resolve_models`](Self::resolve_models) finds one.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed before the
    /// connection opens. Nothing is registered in that case.
    pub async fn subscribe_model(&self, model: Arc<dyn StreamModel>) -> Result<(), StreamError> {
        self.ensure_open().await?;
        if let Some(model_path) = self.inner.registry.add_model(model) {
            self.subscribe(&model_path).await;
        }
        self.resolve_models().await;
        Ok(())
    }

    /// Key and subscribe the deferred models whose path is now known.
    ///
    /// Returns how many were resolved.
    pub async fn resolve_models(&self) -> usize {
        let resolved = self.inner.registry.resolve_pending();
        for model_path in &resolved {
            self.subscribe(model_path).await;
        }
        resolved.len()
    }

    /// Register a handler on a named channel and subscribe to the channel.
    ///
    /// The name gets a leading `/` if it lacks one.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed before the
    /// connection opens.
    pub async fn subscribe_channel(
        &self,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<HandlerId, StreamError> {
        let channel = path::normalize_channel(name);
        self.ensure_open().await?;
        let id = self.inner.registry.add_channel(&channel, handler);
        self.subscribe(&channel).await;
        Ok(id)
    }

    /// Remove a channel handler. The server-side subscription stays.
    pub fn unsubscribe_channel(&self, name: &str, id: HandlerId) -> bool {
        self.inner
            .registry
            .remove_channel_handler(&path::normalize_channel(name), id)
    }

    /// Register a handler for a connection-level signal.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed before the
    /// connection opens.
    pub async fn add_signal_handler(
        &self,
        kind: SignalKind,
        handler: Arc<dyn SignalHandler>,
    ) -> Result<(), StreamError> {
        self.ensure_open().await?;
        self.inner.registry.add_signal(kind, handler);
        Ok(())
    }

    /// Post a request to the remote peer. Failures are logged and yield `None`.
    pub async fn send_request(&self, payload: &Value) -> Option<Value> {
        self.inner.correlator.send_request(payload).await
    }

    /// Answer requests from the remote peer.
    ///
    /// With `internal` set, only requests for the internal endpoint reach the
    /// handler; otherwise only the others do. Every request that reaches the
    /// handler gets exactly one response.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the stream is closed before the
    /// connection opens.
    pub async fn on_external_request(
        &self,
        handler: Arc<dyn RequestHandler>,
        internal: bool,
    ) -> Result<HandlerId, StreamError> {
        let listener = Arc::new(ExternalRequestListener::new(
            self.inner.correlator.clone(),
            handler,
            internal,
        ));
        self.subscribe_channel(EXTSYNC_REQUEST_CHANNEL, listener)
            .await
    }

    /// Close the connection and stop reconnecting.
    pub async fn close(&self) {
        self.inner.connection.close().await;
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Tracked subscription strings, in first-registration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.registry.subscriptions()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.inner.registry.stats()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Send a subscribe frame the first time `subscription` is seen.
    ///
    /// A frame that cannot be sent is not retried here: the subscription is
    /// tracked and goes out with the next replay.
    async fn subscribe(&self, subscription: &str) {
        if !self.inner.registry.track(subscription) {
            return;
        }

        let request = RpcRequest::subscribe(self.inner.endpoint.subscription_url(), subscription);
        match self.inner.connection.send(&request).await {
            Ok(()) => {
                metrics::record_subscription("POST");
                debug!(subscription = %subscription, "Subscribed");
            }
            Err(e) => warn!(subscription = %subscription, error = %e, "Subscribe not sent"),
        }
    }
}
