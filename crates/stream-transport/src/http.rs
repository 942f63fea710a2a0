//! HTTP control plane.
//!
//! Used for the external-sync request/response exchange, which does not
//! travel over the event socket.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::endpoint::{Endpoint, SESSION_PARAM};
use crate::traits::{ControlPlane, TransportError};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Control plane backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    endpoint: Endpoint,
}

impl HttpControlPlane {
    /// Create a control plane with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint) -> Result<Self, TransportError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a control plane with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(endpoint: Endpoint, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    async fn send(&self, method: Method, path: &str, body: &Value) -> Result<Value, TransportError> {
        let url = self.endpoint.api_url(path)?;
        debug!(%method, path = %url.path(), "Control-plane request");

        let response = self
            .client
            .request(method, url)
            .header(SESSION_PARAM, self.endpoint.session())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Http(format!("{}: {}", status, text)));
        }
        parse_body(status, &text)
    }
}

fn parse_body(status: StatusCode, text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| TransportError::Protocol(iotstream_protocol::ProtocolError::Json(e)))
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn post(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.send(Method::POST, path, body).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.send(Method::PATCH, path, body).await
    }
}
