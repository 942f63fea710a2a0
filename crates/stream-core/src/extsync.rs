//! External sync: request/response correlation with a remote peer.
//!
//! Outbound requests and all responses travel over the HTTP control plane,
//! never over the event socket. Inbound requests arrive as events on the
//! [`EXTSYNC_REQUEST_CHANNEL`] and are answered exactly once, keyed by the
//! request's own identifier.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use iotstream_protocol::{ExternalRequest, StreamEvent};
use iotstream_transport::ControlPlane;
use serde_json::{json, Value};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::handler::{panic_message, ChannelHandler, HandlerOutcome};
use crate::metrics;

/// Channel inbound external requests are delivered on.
pub const EXTSYNC_REQUEST_CHANNEL: &str = "/extsync/request";

const REQUEST_PATH: &str = "extsync/request";
const RESPONSE_PATH: &str = "extsync/response";

const STATUS_OK: u16 = 200;
const STATUS_REJECTED: u16 = 400;
const STATUS_HANDLER_FAILED: u16 = 501;

/// Result of a request handler.
pub enum Reply {
    /// Answer immediately.
    Ready(Value),
    /// Answer once the future settles: `Ok` is sent as 200, `Err` as 400.
    Pending(BoxFuture<'static, Result<Value, Value>>),
}

impl Reply {
    #[must_use]
    pub fn ready(body: impl Into<Value>) -> Self {
        Reply::Ready(body.into())
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Reply::Pending(Box::pin(future))
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ready(body) => f.debug_tuple("Ready").field(body).finish(),
            Reply::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A request handler failure. Its body is sent back with status 501.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("request handler failed: {0}")]
pub struct HandlerError(pub Value);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError(Value::String(message.to_string()))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError(Value::String(message))
    }
}

impl From<Value> for HandlerError {
    fn from(body: Value) -> Self {
        HandlerError(body)
    }
}

/// Handles requests coming from a remote peer.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &ExternalRequest) -> Result<Reply, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&ExternalRequest) -> Result<Reply, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &ExternalRequest) -> Result<Reply, HandlerError> {
        self(request)
    }
}

/// Wrap a closure as a request handler.
pub fn request_fn<F>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(&ExternalRequest) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The right to answer one request. Consumed when the response is sent.
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
}

impl PendingResponse {
    fn new(request: &ExternalRequest) -> Self {
        Self {
            id: request.id.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Talks to the peer over the control plane.
pub struct Correlator {
    control: Arc<dyn ControlPlane>,
}

impl Correlator {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// Post a request to the peer and return its immediate reply.
    ///
    /// Failures are logged and yield `None`.
    pub async fn send_request(&self, payload: &Value) -> Option<Value> {
        match self.control.post(REQUEST_PATH, payload).await {
            Ok(reply) => {
                debug!("External sync request sent");
                Some(reply)
            }
            Err(e) => {
                warn!(error = %e, "External sync request failed");
                None
            }
        }
    }

    /// Answer a request.
    pub async fn respond(&self, pending: PendingResponse, code: u16, body: Value) {
        let path = format!("{}/{}", RESPONSE_PATH, pending.id);
        let payload = json!({ "code": code, "body": body });

        metrics::record_extsync_response(code);
        match self.control.patch(&path, &payload).await {
            Ok(_) => debug!(request = %pending.id, code, "External sync response sent"),
            Err(e) => {
                warn!(request = %pending.id, code, error = %e, "Failed to send external sync response");
            }
        }
    }
}

/// Channel handler that feeds inbound requests to a [`RequestHandler`].
pub struct ExternalRequestListener {
    correlator: Arc<Correlator>,
    handler: Arc<dyn RequestHandler>,
    internal: bool,
}

impl ExternalRequestListener {
    /// `internal` selects requests addressed to the internal endpoint;
    /// otherwise only the remaining requests are handled.
    pub fn new(correlator: Arc<Correlator>, handler: Arc<dyn RequestHandler>, internal: bool) -> Self {
        Self {
            correlator,
            handler,
            internal,
        }
    }
}

#[async_trait]
impl ChannelHandler for ExternalRequestListener {
    async fn handle(&self, event: &StreamEvent) -> HandlerOutcome {
        let Some(request) = event.as_request() else {
            return HandlerOutcome::Continue;
        };
        if request.is_internal() != self.internal {
            trace!(request = %request.id, uri = %request.uri, "Request not for this listener");
            return HandlerOutcome::Continue;
        }

        let pending = PendingResponse::new(request);
        let reply = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(request)))
            .unwrap_or_else(|payload| Err(HandlerError::from(panic_message(payload.as_ref()))));

        // Replies go out off the read path.
        let correlator = self.correlator.clone();
        match reply {
            Ok(Reply::Ready(body)) => {
                tokio::spawn(async move { correlator.respond(pending, STATUS_OK, body).await });
            }
            Ok(Reply::Pending(future)) => {
                tokio::spawn(async move {
                    let (code, body) = match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(Ok(body)) => (STATUS_OK, body),
                        Ok(Err(body)) => (STATUS_REJECTED, body),
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            warn!(request = %pending.id, error = %message, "Pending reply panicked");
                            (STATUS_HANDLER_FAILED, Value::String(message))
                        }
                    };
                    correlator.respond(pending, code, body).await;
                });
            }
            Err(HandlerError(body)) => {
                warn!(request = %request.id, error = %body, "Request handler failed");
                tokio::spawn(async move {
                    correlator
                        .respond(pending, STATUS_HANDLER_FAILED, body)
                        .await;
                });
            }
        }

        HandlerOutcome::Continue
    }
}
