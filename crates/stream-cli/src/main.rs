//! # iotstream
//!
//! Connects to the event channel and logs what arrives.
//!
//! ## Usage
//!
//! ```bash
//! # Run with the first config file found in the default locations
//! iotstream
//!
//! # Run with a specific config file
//! iotstream /path/to/iotstream.toml
//!
//! # Run with environment variables
//! IOTSTREAM_SESSION=... IOTSTREAM_SUBSCRIBE__CHANNELS=/network,/device iotstream
//! ```

mod config;
mod metrics;

use anyhow::{Context, Result};
use async_trait::async_trait;
use iotstream_core::{
    channel_fn, request_fn, HandlerOutcome, Reply, ResourceEvent, Signal, SignalKind, Stream,
    StreamEvent, StreamModel,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs the events of one resource path.
struct PathLogger {
    path: String,
}

#[async_trait]
impl StreamModel for PathLogger {
    fn path(&self) -> String {
        self.path.clone()
    }

    async fn handle_stream(&self, event: &ResourceEvent) {
        info!(
            path = %self.path,
            event = %event.event,
            data = %event.data.clone().unwrap_or_default(),
            "Resource event"
        );
    }
}

async fn log_event(event: StreamEvent) -> HandlerOutcome {
    info!(
        path = %event.path(),
        event = %event.kind(),
        "{}",
        serde_json::to_string(&event).unwrap_or_default()
    );
    HandlerOutcome::Continue
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iotstream=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::Config::load(config_path.as_deref())?;

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    let stream = Stream::new(config.stream_config()).context("Invalid stream configuration")?;
    info!("Connecting to {}", stream.endpoint().host());

    stream
        .add_signal_handler(
            SignalKind::Error,
            Arc::new(|signal: &Signal| warn!(?signal, "Stream error")),
        )
        .await?;
    stream
        .add_signal_handler(
            SignalKind::Close,
            Arc::new(|_: &Signal| warn!("Stream lost, reconnecting")),
        )
        .await?;

    for path in &config.subscribe.paths {
        stream
            .subscribe_model(Arc::new(PathLogger { path: path.clone() }))
            .await?;
    }
    for channel in &config.subscribe.channels {
        stream.subscribe_channel(channel, channel_fn(log_event)).await?;
    }
    if config.subscribe.extsync {
        let echo = request_fn(|request| {
            info!(request = %request.id, uri = %request.uri, "External request");
            Ok(Reply::ready(request.body.clone()))
        });
        stream.on_external_request(echo, false).await?;
    }

    info!(subscriptions = ?stream.subscriptions(), "Listening, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    stream.close().await;

    Ok(())
}
