//! In-memory doubles shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use iotstream_protocol::{codec, ResourceEvent, StreamEvent};
use iotstream_transport::{
    Connection, ConnectionId, ConnectionSink, ConnectionStream, ControlPlane, Transport,
    TransportError,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::connection::ConnectionHandler;
use crate::handler::{Signal, StreamModel};

/// Let every spawned task run until it blocks. Requires paused time.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub(crate) fn test_config() -> StreamConfig {
    StreamConfig::new("https://example.com/services", "session-1")
}

/// Decoded external-sync event carrying a request.
pub(crate) fn extsync_event(id: &str, uri: &str) -> StreamEvent {
    codec::decode_event(extsync_object(id, uri)).unwrap()
}

/// Raw external-sync event object, as the server sends it.
pub(crate) fn extsync_object(id: &str, uri: &str) -> Value {
    let mut value = codec::event_object(
        "/extsync/request",
        "create",
        Some(json!({
            "meta": { "id": id },
            "uri": uri,
            "method": "POST",
            "body": "{\"hello\":\"world\"}"
        })),
    );
    value["meta_object"] = json!({ "type": "extsync" });
    value
}

/// How the next connection attempt behaves.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Attempt {
    Accept,
    Fail,
    Hang,
}

type ServerTx = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

#[derive(Default)]
struct MockState {
    connects: usize,
    script: VecDeque<Attempt>,
    servers: Vec<ServerTx>,
    sent: Vec<String>,
    closed: usize,
}

/// Transport whose connections are fed by the test.
#[derive(Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.state.lock().unwrap().script.extend(attempts);
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    /// Deliver a frame on the most recent connection.
    pub(crate) fn push(&self, frame: impl Into<String>) {
        let state = self.state.lock().unwrap();
        let tx = state.servers.last().expect("no connection");
        tx.send(Ok(Bytes::from(frame.into()))).unwrap();
    }

    /// Report a transport error on the most recent connection.
    pub(crate) fn push_error(&self, message: &str) {
        let state = self.state.lock().unwrap();
        let tx = state.servers.last().expect("no connection");
        tx.send(Err(TransportError::ReceiveFailed(message.to_string())))
            .unwrap();
    }

    /// Close the most recent connection from the server side.
    pub(crate) fn drop_connection(&self) {
        self.state.lock().unwrap().servers.pop();
    }

    /// Every frame sent by the client, decoded as JSON.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// Data of every `POST` subscribe frame sent.
    pub(crate) fn subscribe_frames(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|f| f["method"] == "POST")
            .map(|f| f["params"]["data"].clone())
            .collect()
    }

    /// Data of every `PATCH` re-subscribe frame sent.
    pub(crate) fn resubscribe_frames(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|f| f["method"] == "PATCH")
            .map(|f| f["params"]["data"]["subscription"].clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            state.script.pop_front().unwrap_or(Attempt::Accept)
        };

        match attempt {
            Attempt::Fail => Err(TransportError::ConnectFailed("refused".into())),
            Attempt::Hang => std::future::pending().await,
            Attempt::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.state.lock().unwrap().servers.push(tx);
                Ok(Connection {
                    id: ConnectionId::generate(),
                    sink: Box::new(MockSink {
                        state: self.state.clone(),
                    }),
                    stream: Box::new(MockStream { rx }),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSink {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ConnectionSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.state.lock().unwrap().sent.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl ConnectionStream for MockStream {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.rx.recv().await
    }
}

/// Control plane that records calls.
#[derive(Default)]
pub(crate) struct MockControlPlane {
    calls: Mutex<Vec<(&'static str, String, Value)>>,
    fail: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl MockControlPlane {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Hold every call for `delay` before it is recorded and answered.
    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<(&'static str, String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(
        &self,
        method: &'static str,
        path: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.clone()));
        if *self.fail.lock().unwrap() {
            Err(TransportError::Http("503 Service Unavailable".into()))
        } else {
            Ok(json!({ "echo": body }))
        }
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.wait().await;
        self.record("POST", path, body)
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.wait().await;
        self.record("PATCH", path, body)
    }
}

/// Model that records what it receives.
pub(crate) struct RecordingModel {
    path: Mutex<String>,
    events: Mutex<Vec<ResourceEvent>>,
}

impl RecordingModel {
    pub(crate) fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Mutex::new(path.to_string()),
            events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_path(&self, path: &str) {
        *self.path.lock().unwrap() = path.to_string();
    }

    pub(crate) fn events(&self) -> Vec<ResourceEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamModel for RecordingModel {
    fn path(&self) -> String {
        self.path.lock().unwrap().clone()
    }

    async fn handle_stream(&self, event: &ResourceEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Connection handler that records frames and signals.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub(crate) frames: Mutex<Vec<Bytes>>,
    pub(crate) signals: Mutex<Vec<Signal>>,
    pub(crate) subscriptions: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub(crate) fn frames(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait]
impl ConnectionHandler for RecordingHandler {
    async fn on_frame(&self, frame: Bytes) {
        assert_ne!(frame.as_ref(), b"panic", "frame handler bug");
        self.frames.lock().unwrap().push(frame);
    }

    fn on_signal(&self, signal: Signal) {
        self.signals.lock().unwrap().push(signal);
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}
