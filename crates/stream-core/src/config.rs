//! Stream configuration.

use std::time::Duration;

use iotstream_transport::Endpoint;

use crate::error::StreamError;

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// HTTP(S) base URL of the API, e.g. `https://example.com/services`.
    pub base_url: String,
    /// Session token sent with every connection and request.
    pub session: String,
    /// API version path segment.
    pub api_version: String,
    /// Bounded wait for a socket to open, on top of the current backoff.
    pub open_timeout: Duration,
    /// Initial reconnect backoff.
    pub base_backoff: Duration,
    /// Ceiling for the reconnect backoff.
    pub max_backoff: Duration,
    /// Timeout for control-plane requests.
    pub request_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wappsto.com/services".to_string(),
            session: String::new(),
            api_version: "2.1".to_string(),
            open_timeout: Duration::from_secs(1),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl StreamConfig {
    /// Create a configuration for a base URL and session.
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session: session.into(),
            ..Default::default()
        }
    }

    /// Resolve the endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the backoff bounds are inconsistent.
    pub fn endpoint(&self) -> Result<Endpoint, StreamError> {
        if self.base_backoff.is_zero() || self.base_backoff > self.max_backoff {
            return Err(StreamError::Config(format!(
                "base_backoff {:?} must be non-zero and at most max_backoff {:?}",
                self.base_backoff, self.max_backoff
            )));
        }
        Ok(Endpoint::new(
            &self.base_url,
            self.api_version.clone(),
            self.session.clone(),
        )?)
    }
}
