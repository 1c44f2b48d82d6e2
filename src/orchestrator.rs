//! Wires the transport, pipeline, and bus into one runnable client.
//!
//! [`AlphaStream`] owns one of each component. `start()` connects the
//! transport and spawns the pipeline task; incoming data frames then flow
//! normalize → filter → dedup → publish, with aggregate counters updated at
//! every stage. `stop()` cascades: transport, then the dedup sweeper, then
//! the bus registry.
//!
//! # Example
//!
//! ```no_run
//! use alpha_stream::config::{Config, OutputsConfig};
//! use alpha_stream::orchestrator::AlphaStream;
//! use alpha_stream::types::subscription::Channel;
//!
//! # #[tokio::main]
//! # async fn main() -> alpha_stream::error::Result<()> {
//! let config = Config {
//!     base_url: "wss://stream.example.com".into(),
//!     token: "your-token".into(),
//!     channels: vec![Channel::All],
//!     users: vec![],
//!     reconnect: Default::default(),
//!     dedup_ttl_secs: 60,
//!     shutdown_recovery: Default::default(),
//!     outputs: OutputsConfig { cli: true, dashboard: false, alerts: false },
//! };
//!
//! let client = AlphaStream::new(config)?;
//! let mut events = client.bus().channel("cli", 64);
//! client.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{} @{}: {}", event.kind, event.actor.handle, event.primary_id);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::config::{Config, OutputsConfig};
use crate::constants::{self, topics};
use crate::error::Result;
use crate::pipeline::dedup::DedupCache;
use crate::pipeline::filter::{FilterChain, KeywordFilter, KindFilter, UserFilter};
use crate::pipeline::normalizer::Normalizer;
use crate::types::event::EventKind;
use crate::types::subscription::{Channel, SubscriptionState};
use crate::ws::manager::SubscriptionManager;
use crate::ws::transport::{ConnectionState, StreamTransport, TransportConfig};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    total_received: AtomicU64,
    delivered: AtomicU64,
    deduped: AtomicU64,
    filtered: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time aggregate statistics. Counter reads are eventually
/// consistent with respect to in-flight events.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Data frames handed to the pipeline.
    pub total_received: u64,
    /// Events published to at least one topic.
    pub delivered: u64,
    /// Events suppressed by the dedup cache.
    pub deduped: u64,
    /// Events dropped by a filter.
    pub filtered: u64,
    /// Frames the normalizer (or the final validation) rejected.
    pub rejected: u64,
    /// Current transport state.
    pub connection_state: ConnectionState,
    /// Frames queued between the transport and the pipeline.
    pub buffered_frames: usize,
    /// Reconnect attempts fired since the last confirmation.
    pub reconnect_attempts: u32,
}

// ---------------------------------------------------------------------------
// AlphaStream
// ---------------------------------------------------------------------------

/// The assembled streaming client.
pub struct AlphaStream {
    transport: Arc<StreamTransport>,
    manager: SubscriptionManager,
    bus: Arc<EventBus>,
    dedup: Arc<DedupCache>,
    user_filter: Arc<UserFilter>,
    keyword_filter: Arc<KeywordFilter>,
    kind_filter: Arc<KindFilter>,
    filters: FilterChain,
    counters: Arc<Counters>,
    dedup_ttl: Duration,
    outputs: OutputsConfig,
    pipeline: Mutex<Option<JoinHandle<()>>>,
}

impl AlphaStream {
    /// Build the client from validated configuration. No network activity
    /// happens until [`start`](Self::start).
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let initial = SubscriptionState::from_config(&config.channels, &config.users);
        let mut transport_config = TransportConfig::new(&config.base_url, &config.token);
        transport_config.reconnect = config.reconnect.clone();
        transport_config.shutdown_recovery = config.shutdown_recovery;

        let transport = Arc::new(StreamTransport::new(transport_config, initial));
        let manager = SubscriptionManager::new(&transport);

        let user_filter = Arc::new(UserFilter::new(&config.users));
        let keyword_filter = Arc::new(KeywordFilter::new(Vec::<String>::new()));
        // Installed empty: an empty allowed-set accepts every kind until a
        // consumer scopes it via set_kind_filter.
        let kind_filter = Arc::new(KindFilter::new([]));
        let mut filters = FilterChain::new();
        filters.push(user_filter.clone());
        filters.push(keyword_filter.clone());
        filters.push(kind_filter.clone());

        Ok(Self {
            transport,
            manager,
            bus: Arc::new(EventBus::new()),
            dedup: Arc::new(DedupCache::new()),
            user_filter,
            keyword_filter,
            kind_filter,
            filters,
            counters: Arc::new(Counters::default()),
            dedup_ttl: config.dedup_ttl(),
            outputs: config.outputs,
            pipeline: Mutex::new(None),
        })
    }

    /// The fan-out bus collaborators attach to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The underlying transport (state, errors, raw frames).
    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    /// Spawn the pipeline task and connect the transport.
    ///
    /// Resolves once the initial subscription is confirmed; fails on
    /// authentication errors, the confirmation timeout, or a close before
    /// confirmation.
    pub async fn start(&self) -> Result<()> {
        {
            let mut pipeline = self.pipeline.lock().expect("pipeline lock poisoned");
            if pipeline.as_ref().is_some_and(|t| !t.is_finished()) {
                return Err(crate::error::StreamError::InvalidArgument(
                    "client is already started".into(),
                ));
            }
            let Some(frames) = self.transport.frames() else {
                return Err(crate::error::StreamError::InvalidArgument(
                    "client cannot be restarted after stop".into(),
                ));
            };
            self.dedup.spawn_sweeper(constants::DEDUP_SWEEP_INTERVAL);
            *pipeline = Some(tokio::spawn(pipeline_task(
                frames,
                Normalizer::new(),
                self.filters.clone(),
                self.dedup.clone(),
                self.dedup_ttl,
                self.bus.clone(),
                self.outputs.clone(),
                self.counters.clone(),
            )));
        }

        self.transport.connect().await?;
        tracing::info!("stream client started");
        Ok(())
    }

    /// Stop everything: transport, pipeline task, dedup sweeper, bus.
    pub async fn stop(&self) {
        self.transport.disconnect().await;
        if let Some(task) = self.pipeline.lock().expect("pipeline lock poisoned").take() {
            task.abort();
        }
        self.dedup.stop();
        self.bus.clear();
        tracing::info!("stream client stopped");
    }

    /// Atomically change the live subscription; on success the committed
    /// state survives reconnects, and the client-side user filter follows
    /// the new user set.
    pub async fn update_subscription(
        &self,
        channels: &[Channel],
        users: &[String],
    ) -> Result<SubscriptionState> {
        let state = self
            .manager
            .update(channels, users, constants::UPDATE_TIMEOUT)
            .await?;
        self.user_filter.set_users(&state.users);
        Ok(state)
    }

    /// Snapshot of the committed subscription.
    pub fn subscription(&self) -> SubscriptionState {
        self.manager.current()
    }

    /// Replace the keyword filter's configuration.
    pub fn set_keywords<I, S>(&self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keyword_filter.set_keywords(keywords);
    }

    /// Scope delivery to the given event kinds. An empty set restores the
    /// default (all kinds allowed).
    pub fn set_kind_filter<I>(&self, kinds: I)
    where
        I: IntoIterator<Item = EventKind>,
    {
        self.kind_filter.set_kinds(kinds);
    }

    /// Current aggregate statistics.
    pub fn stats(&self) -> Stats {
        Stats {
            total_received: self.counters.total_received.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            deduped: self.counters.deduped.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            connection_state: self.transport.state(),
            buffered_frames: self.transport.buffered_frames(),
            reconnect_attempts: self.transport.reconnect_attempts(),
        }
    }
}

impl Drop for AlphaStream {
    fn drop(&mut self) {
        if let Some(task) = self.pipeline.lock().expect("pipeline lock poisoned").take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline task
// ---------------------------------------------------------------------------

/// Consume frames in receipt order: normalize → filter → dedup → publish.
#[allow(clippy::too_many_arguments)]
async fn pipeline_task(
    mut frames: tokio::sync::mpsc::Receiver<crate::types::frame::ServerFrame>,
    normalizer: Normalizer,
    filters: FilterChain,
    dedup: Arc<DedupCache>,
    dedup_ttl: Duration,
    bus: Arc<EventBus>,
    outputs: OutputsConfig,
    counters: Arc<Counters>,
) {
    while let Some(frame) = frames.recv().await {
        counters.total_received.fetch_add(1, Ordering::Relaxed);

        let Some(event) = normalizer.normalize(&frame) else {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        if !filters.accept(&event) {
            counters.filtered.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let fingerprint = event.fingerprint();
        if dedup.has(&fingerprint) {
            counters.deduped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %fingerprint, "duplicate suppressed");
            continue;
        }
        dedup.add(fingerprint, dedup_ttl);

        // Final validation before publish: an event without a usable
        // identity never reaches a sink.
        if event.actor.handle.is_empty() || event.actor.handle == "unknown" {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        counters.delivered.fetch_add(1, Ordering::Relaxed);
        if outputs.cli {
            bus.publish(topics::CLI, &event);
        }
        if outputs.dashboard {
            bus.publish(topics::DASHBOARD, &event);
        }
        if outputs.alerts {
            bus.publish(topics::ALERTS, &event);
        }
    }
    tracing::debug!("pipeline task ended: frame channel closed");
}
