//! Endpoint URL derivation.
//!
//! Everything hangs off the HTTP(S) base URL of the API, e.g.
//! `https://example.com/services`:
//!
//! - stream: `wss://example.com/services/2.1/websocket/open?X-Session=<session>`
//! - subscribe RPC: `/services/2.1/websocket/open/subscription`
//! - re-subscribe RPC: `/services/2.1/websocket/open`

use url::Url;

use crate::traits::TransportError;

/// Query parameter carrying the session token.
pub const SESSION_PARAM: &str = "X-Session";

/// Resolved endpoint for one API session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    version: String,
    session: String,
}

impl Endpoint {
    /// Create an endpoint from an `http` or `https` base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or uses another scheme.
    pub fn new(
        base_url: &str,
        version: impl Into<String>,
        session: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme '{}' (expected http or https)",
                    other
                )))
            }
        }

        Ok(Self {
            base,
            version: version.into(),
            session: session.into(),
        })
    }

    /// API version segment.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Session token.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Host part of the base URL, for logging.
    #[must_use]
    pub fn host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    fn base_path(&self) -> &str {
        self.base.path().trim_end_matches('/')
    }

    /// WebSocket URL of the event channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme cannot be rewritten.
    pub fn stream_url(&self) -> Result<Url, TransportError> {
        let scheme = if self.base.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };

        let mut url = self.base.clone();
        url.set_scheme(scheme)
            .map_err(|()| TransportError::InvalidUrl(format!("cannot use scheme {}", scheme)))?;
        url.set_path(&format!("{}/websocket/open", self.versioned_base_path()));
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair(SESSION_PARAM, &self.session);
        Ok(url)
    }

    fn versioned_base_path(&self) -> String {
        format!("{}/{}", self.base_path(), self.version)
    }

    /// RPC URL for adding one subscription.
    #[must_use]
    pub fn subscription_url(&self) -> String {
        format!("{}/websocket/open/subscription", self.versioned_base_path())
    }

    /// RPC URL for replacing the subscription set.
    #[must_use]
    pub fn open_url(&self) -> String {
        format!("{}/websocket/open", self.versioned_base_path())
    }

    /// Absolute HTTP URL for a control-plane path relative to the base,
    /// e.g. `extsync/request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn api_url(&self, path: &str) -> Result<Url, TransportError> {
        let joined = format!(
            "{}/{}",
            self.versioned_base_path(),
            path.trim_start_matches('/')
        );
        let mut url = self.base.clone();
        url.set_path(&joined);
        url.set_query(None);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_secure() {
        let endpoint = Endpoint::new("https://example.com/services", "2.1", "abc").unwrap();
        assert_eq!(
            endpoint.stream_url().unwrap().as_str(),
            "wss://example.com/services/2.1/websocket/open?X-Session=abc"
        );
    }

    #[test]
    fn test_stream_url_plain_with_trailing_slash() {
        let endpoint = Endpoint::new("http://localhost:8080/services/", "2.1", "s").unwrap();
        assert_eq!(
            endpoint.stream_url().unwrap().as_str(),
            "ws://localhost:8080/services/2.1/websocket/open?X-Session=s"
        );
    }

    #[test]
    fn test_rpc_urls() {
        let endpoint = Endpoint::new("https://example.com/services", "2.1", "s").unwrap();
        assert_eq!(
            endpoint.subscription_url(),
            "/services/2.1/websocket/open/subscription"
        );
        assert_eq!(endpoint.open_url(), "/services/2.1/websocket/open");
    }

    #[test]
    fn test_api_url() {
        let endpoint = Endpoint::new("https://example.com/services", "2.1", "s").unwrap();
        assert_eq!(
            endpoint.api_url("/extsync/request").unwrap().as_str(),
            "https://example.com/services/2.1/extsync/request"
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(Endpoint::new("ftp://example.com", "2.1", "s").is_err());
        assert!(Endpoint::new("not a url", "2.1", "s").is_err());
    }
}
