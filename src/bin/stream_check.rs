//! Binary to connect to an upstream activity stream and print delivered
//! events, for inspecting a live endpoint.
//!
//! # Usage
//!
//! ```sh
//! export ALPHA_STREAM_URL="wss://stream.example.com"
//! export ALPHA_STREAM_TOKEN="your-token"
//! # optional: comma-separated lists
//! export ALPHA_STREAM_CHANNELS="tweets,following"
//! export ALPHA_STREAM_USERS="alice,bob"
//! cargo run --bin stream_check --features cli
//! ```
//!
//! Exits 0 on a graceful Ctrl-C stop, non-zero on a fatal initialization or
//! connection error.

use std::env;
use std::sync::Arc;

use alpha_stream::bus::{EventSink, SinkError};
use alpha_stream::config::{Config, OutputsConfig};
use alpha_stream::orchestrator::AlphaStream;
use alpha_stream::types::event::InternalEvent;
use alpha_stream::types::subscription::Channel;

/// Prints every delivered event on one line.
struct PrintSink;

impl EventSink for PrintSink {
    fn on_event(&self, event: &InternalEvent) -> Result<(), SinkError> {
        println!(
            "{} {:<16} @{} ({}) id={}",
            event.timestamp, event.kind, event.actor.handle, event.actor.display_name,
            event.primary_id
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> alpha_stream::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let base_url =
        env::var("ALPHA_STREAM_URL").expect("set ALPHA_STREAM_URL env var before running");
    let token =
        env::var("ALPHA_STREAM_TOKEN").expect("set ALPHA_STREAM_TOKEN env var before running");

    let channels = match env::var("ALPHA_STREAM_CHANNELS") {
        Ok(raw) => raw
            .split(',')
            .map(|s| Channel::parse(s.trim()))
            .collect::<alpha_stream::error::Result<Vec<_>>>()?,
        Err(_) => vec![Channel::All],
    };
    let users: Vec<String> = env::var("ALPHA_STREAM_USERS")
        .map(|raw| raw.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    let config = Config {
        base_url,
        token,
        channels,
        users,
        reconnect: Default::default(),
        dedup_ttl_secs: 60,
        shutdown_recovery: Default::default(),
        outputs: OutputsConfig {
            cli: true,
            ..Default::default()
        },
    };

    let client = AlphaStream::new(config)?;
    client.bus().subscribe("cli", Arc::new(PrintSink));

    println!("Connecting to the upstream stream…");
    client.start().await?;
    println!("Subscribed: {:?}", client.subscription().channels);
    println!("Listening — press Ctrl-C to stop.\n");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");

    println!("\nStopping…");
    client.stop().await;

    let stats = client.stats();
    println!(
        "received={} delivered={} deduped={} filtered={}",
        stats.total_received, stats.delivered, stats.deduped, stats.filtered
    );

    Ok(())
}
