//! Client configuration.
//!
//! Configuration is loaded from:
//! - A TOML file (given as the first argument, or the first default location found)
//! - Environment variables (`IOTSTREAM_*`, nested keys separated by `__`)

use anyhow::{Context, Result};
use iotstream_core::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "IOTSTREAM";

const DEFAULT_PATHS: [&str; 3] = [
    "iotstream.toml",
    "/etc/iotstream/iotstream.toml",
    "~/.config/iotstream/iotstream.toml",
];

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP(S) base URL of the API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Session token.
    #[serde(default)]
    pub session: String,

    /// API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Connection timings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// What to subscribe to at startup.
    #[serde(default)]
    pub subscribe: SubscribeConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Connection timings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_open_timeout")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Startup subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeConfig {
    /// Resource paths to log, e.g. `/network/<id>`.
    #[serde(default)]
    pub paths: Vec<String>,

    /// Channels to log, e.g. `/network`.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Answer external sync requests with an echo of their body.
    #[serde(default)]
    pub extsync: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_base_url() -> String {
    "https://wappsto.com/services".to_string()
}

fn default_api_version() -> String {
    "2.1".to_string()
}

fn default_open_timeout() -> u64 {
    1_000
}

fn default_base_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    300_000 // 5 minutes
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session: String::new(),
            api_version: default_api_version(),
            connection: ConnectionConfig::default(),
            subscribe: SubscribeConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or the first default location that
    /// exists, with environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_default_file(),
        };

        let mut builder = ::config::Config::builder();
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Using config file");
            builder = builder.add_source(::config::File::from(file.as_path()).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("subscribe.paths")
                .with_list_parse_key("subscribe.channels"),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .context("Failed to load configuration")
    }

    /// Stream settings derived from this configuration.
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.base_url.clone(),
            session: self.session.clone(),
            api_version: self.api_version.clone(),
            open_timeout: Duration::from_millis(self.connection.open_timeout_ms),
            base_backoff: Duration::from_millis(self.connection.base_backoff_ms),
            max_backoff: Duration::from_millis(self.connection.max_backoff_ms),
            request_timeout: Duration::from_millis(self.connection.request_timeout_ms),
        }
    }
}

fn find_default_file() -> Option<PathBuf> {
    DEFAULT_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}
