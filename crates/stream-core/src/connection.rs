//! Connection lifecycle.
//!
//! A [`ConnectionManager`] owns at most one socket. Opening is lazy and
//! shared: concurrent callers of [`ConnectionManager::ensure_open`] wait on
//! the same attempt and are released in arrival order. Failed or timed-out
//! attempts back off exponentially; every successful open replays the full
//! subscription set in one frame before waiters are released.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::FutureExt;
use iotstream_protocol::{codec, RpcRequest};
use iotstream_transport::{Connection, ConnectionId, ConnectionSink, Endpoint, Transport};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::handler::{panic_message, Signal};
use crate::metrics;

/// Socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    Closed,
    /// An open attempt or a reconnect is in progress.
    Connecting,
    /// The socket is open.
    Open,
    /// An explicit close is in progress.
    Closing,
}

/// Receives what the socket produces.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Handle one inbound frame.
    async fn on_frame(&self, frame: Bytes);

    /// Handle a connection-level signal.
    fn on_signal(&self, signal: Signal);

    /// Subscriptions to replay after every open.
    fn subscriptions(&self) -> Vec<String>;
}

type Waiter = oneshot::Sender<Result<(), StreamError>>;

struct Inner {
    state: ConnectionState,
    backoff: Backoff,
    waiters: Vec<Waiter>,
    /// Set while a connection task runs.
    stop: Option<watch::Sender<bool>>,
}

/// Manages the single socket of a stream.
pub struct ConnectionManager {
    url: String,
    resubscribe_url: String,
    open_timeout: Duration,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ConnectionHandler>,
    inner: Mutex<Inner>,
    // Lock order: `socket` before `inner`. `inner` is never held across an await.
    socket: AsyncMutex<Option<(ConnectionId, Box<dyn ConnectionSink>)>>,
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

impl ConnectionManager {
    /// Create a manager. Nothing is opened until [`ensure_open`](Self::ensure_open).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream URL cannot be derived from the endpoint.
    pub fn new(
        config: &StreamConfig,
        endpoint: &Endpoint,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<Self>, StreamError> {
        Ok(Arc::new(Self {
            url: endpoint.stream_url()?.to_string(),
            resubscribe_url: endpoint.open_url(),
            open_timeout: config.open_timeout,
            transport,
            handler,
            inner: Mutex::new(Inner {
                state: ConnectionState::Closed,
                backoff: Backoff::new(config.base_backoff, config.max_backoff),
                waiters: Vec::new(),
                stop: None,
            }),
            socket: AsyncMutex::new(None),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Current reconnect backoff.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.lock().backoff.current()
    }

    /// Wait until the socket is open, starting a connection if none is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the manager is closed before the
    /// socket opens.
    pub async fn ensure_open(self: &Arc<Self>) -> Result<(), StreamError> {
        let waiter = {
            let mut inner = self.lock();
            match inner.state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => {}
                ConnectionState::Closed | ConnectionState::Closing => {
                    let (stop_tx, stop_rx) = watch::channel(false);
                    inner.stop = Some(stop_tx);
                    inner.state = ConnectionState::Connecting;
                    debug!(url = %self.url, transport = self.transport.name(), "Starting connection");
                    tokio::spawn(self.clone().run(stop_rx));
                }
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };

        waiter.await.unwrap_or(Err(StreamError::Closed))
    }

    /// Send a control frame on the open socket.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotConnected`] if no socket is open, or the
    /// encode or transport error.
    pub async fn send(&self, request: &RpcRequest) -> Result<(), StreamError> {
        let text = codec::encode(request)?;
        let mut socket = self.socket.lock().await;
        let Some((id, sink)) = socket.as_mut() else {
            return Err(StreamError::NotConnected);
        };
        trace!(connection = %id, request = request.id, url = %request.params.url, "Sending control frame");
        sink.send_text(text).await?;
        Ok(())
    }

    /// Close the socket and stop reconnecting. Idempotent.
    ///
    /// Pending [`ensure_open`](Self::ensure_open) callers fail with
    /// [`StreamError::Closed`].
    pub async fn close(&self) {
        let mut socket = self.socket.lock().await;
        if !self.halt(ConnectionState::Closing) {
            return;
        }
        let current = socket.take();
        drop(socket);

        if let Some((id, mut sink)) = current {
            if let Err(e) = sink.close().await {
                debug!(connection = %id, error = %e, "Error closing socket");
            }
            info!(connection = %id, "Connection closed");
        }

        let mut inner = self.lock();
        if inner.state == ConnectionState::Closing {
            inner.state = ConnectionState::Closed;
        }
    }

    /// Stop the connection task without waiting for the socket to close.
    pub fn shutdown(&self) {
        self.halt(ConnectionState::Closed);
    }

    /// Signal the connection task to stop. Returns `false` if none was running.
    fn halt(&self, next: ConnectionState) -> bool {
        let waiters = {
            let mut inner = self.lock();
            let Some(stop) = inner.stop.take() else {
                return false;
            };
            stop.send_replace(true);
            inner.state = next;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(Err(StreamError::Closed));
        }
        true
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            let wait = self.open_timeout + self.backoff();
            let attempt = tokio::select! {
                _ = stopped(&mut stop) => return,
                attempt = tokio::time::timeout(wait, self.transport.connect(&self.url)) => attempt,
            };

            let Connection {
                id,
                sink,
                mut stream,
            } = match attempt {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    warn!(error = %e, "Connection attempt failed");
                    self.handler.on_signal(Signal::Error(e.to_string()));
                    if !self.retry(&mut stop).await {
                        return;
                    }
                    continue;
                }
                Err(_) => {
                    warn!(timeout_ms = wait.as_millis() as u64, "Connection attempt timed out");
                    if !self.retry(&mut stop).await {
                        return;
                    }
                    continue;
                }
            };

            if !self.attach(id.clone(), sink, &stop).await {
                return;
            }

            loop {
                let item = tokio::select! {
                    _ = stopped(&mut stop) => return,
                    item = stream.recv() => item,
                };
                match item {
                    Some(Ok(frame)) => {
                        metrics::record_frame(frame.len());
                        let handled = AssertUnwindSafe(self.handler.on_frame(frame)).catch_unwind();
                        if let Err(payload) = handled.await {
                            warn!(
                                connection = %id,
                                error = %panic_message(payload.as_ref()),
                                "Frame handler panicked"
                            );
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "Socket error");
                        self.handler.on_signal(Signal::Error(e.to_string()));
                    }
                    None => break,
                }
            }

            if !self.detach(&id, &stop).await {
                return;
            }
            info!(connection = %id, "Connection lost");
            self.handler.on_signal(Signal::Close);
            if !self.retry(&mut stop).await {
                return;
            }
        }
    }

    /// Install a freshly opened socket, replay subscriptions and release
    /// waiters. Returns `false` if the manager was stopped meanwhile.
    async fn attach(
        &self,
        id: ConnectionId,
        mut sink: Box<dyn ConnectionSink>,
        stop: &watch::Receiver<bool>,
    ) -> bool {
        let mut socket = self.socket.lock().await;
        let waiters = {
            let mut inner = self.lock();
            if *stop.borrow() {
                None
            } else {
                inner.state = ConnectionState::Open;
                inner.backoff.reset();
                Some(std::mem::take(&mut inner.waiters))
            }
        };

        let Some(waiters) = waiters else {
            drop(socket);
            let _ = sink.close().await;
            return false;
        };

        info!(connection = %id, "Connection open");
        *socket = Some((id, sink));
        drop(socket);

        self.replay().await;
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    async fn replay(&self) {
        let subscriptions = self.handler.subscriptions();
        if subscriptions.is_empty() {
            return;
        }

        let request = RpcRequest::resubscribe(self.resubscribe_url.clone(), &subscriptions);
        match self.send(&request).await {
            Ok(()) => {
                metrics::record_subscription("PATCH");
                info!(count = subscriptions.len(), "Subscriptions replayed");
            }
            Err(e) => warn!(error = %e, "Failed to replay subscriptions"),
        }
    }

    /// Forget a socket that ended. Returns `false` if the manager was stopped.
    async fn detach(&self, id: &ConnectionId, stop: &watch::Receiver<bool>) -> bool {
        let mut socket = self.socket.lock().await;
        if socket.as_ref().is_some_and(|(current, _)| current == id) {
            *socket = None;
        }

        let mut inner = self.lock();
        if *stop.borrow() {
            return false;
        }
        inner.state = ConnectionState::Connecting;
        true
    }

    /// Sleep the current backoff and double it for the next failure.
    /// Returns `false` if stopped meanwhile.
    async fn retry(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let delay = {
            let mut inner = self.lock();
            if *stop.borrow() {
                return false;
            }
            inner.state = ConnectionState::Connecting;
            inner.backoff.fail()
        };

        metrics::record_reconnect();
        info!(backoff_ms = delay.as_millis() as u64, "Reconnecting");

        tokio::select! {
            _ = stopped(stop) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
