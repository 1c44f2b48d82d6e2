//! # alpha-stream
//!
//! A resilient client for an upstream activity stream: maintains a
//! persistent, token-authenticated WebSocket subscription, normalizes
//! upstream event records into a canonical shape, deduplicates them over a
//! sliding time window, and fans them out to local consumer topics
//! (`cli`, `dashboard`, `alerts`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use alpha_stream::config::{Config, OutputsConfig};
//! use alpha_stream::orchestrator::AlphaStream;
//! use alpha_stream::types::subscription::Channel;
//!
//! #[tokio::main]
//! async fn main() -> alpha_stream::error::Result<()> {
//!     let config = Config {
//!         base_url: "wss://stream.example.com".into(),
//!         token: std::env::var("ALPHA_STREAM_TOKEN").unwrap(),
//!         channels: vec![Channel::All],
//!         users: vec![],
//!         reconnect: Default::default(),
//!         dedup_ttl_secs: 60,
//!         shutdown_recovery: Default::default(),
//!         outputs: OutputsConfig { cli: true, ..Default::default() },
//!     };
//!
//!     let client = AlphaStream::new(config)?;
//!     let mut events = client.bus().channel("cli", 64);
//!     client.start().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{} @{}", event.kind, event.actor.handle);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod pipeline;
pub mod types;
pub mod ws;

/// Re-export the assembled client at crate root for convenience.
pub use orchestrator::AlphaStream;
/// Re-export the error type and Result alias.
pub use error::{Result, StreamError};
/// Re-export the canonical event record.
pub use types::event::{Actor, EventKind, InternalEvent};
