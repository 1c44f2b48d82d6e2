//! Topic-keyed fan-out bus for delivered events.
//!
//! Collaborators (terminal renderer, dashboard, alert formatters) attach as
//! [`EventSink`]s, either directly or through the broadcast-channel adapter.
//! Each sink invocation is isolated: a failing sink is logged and skipped,
//! and never prevents delivery to the sinks after it. Events published to the
//! same topic reach each of that topic's sinks in publication order.
//!
//! # Example
//!
//! ```
//! use alpha_stream::bus::EventBus;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.channel("cli", 64);
//! // ... bus.publish("cli", &event) delivers to rx ...
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::event::InternalEvent;

// ---------------------------------------------------------------------------
// Sink interface
// ---------------------------------------------------------------------------

/// A failure reported by a sink. Logged and swallowed by the bus.
#[derive(Debug, thiserror::Error)]
#[error("sink failure: {0}")]
pub struct SinkError(pub String);

/// A consumer of delivered events.
pub trait EventSink: Send + Sync {
    /// Handle one event. Errors are swallowed by the bus; other sinks for
    /// the same event still run.
    fn on_event(&self, event: &InternalEvent) -> Result<(), SinkError>;
}

/// Identifies a registered sink so it can be removed later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandle {
    topic: String,
    id: u64,
}

impl SinkHandle {
    /// The topic this sink is registered under.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Topic-keyed multiplexer with isolated per-sink delivery.
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<(u64, Arc<dyn EventSink>)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under `topic`. Sinks are invoked in registration
    /// order.
    pub fn subscribe(&self, topic: impl Into<String>, sink: Arc<dyn EventSink>) -> SinkHandle {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics
            .lock()
            .expect("bus lock poisoned")
            .entry(topic.clone())
            .or_default()
            .push((id, sink));
        tracing::debug!(topic = %topic, id, "sink registered");
        SinkHandle { topic, id }
    }

    /// Remove a previously registered sink. Returns whether it was found.
    pub fn unsubscribe(&self, handle: &SinkHandle) -> bool {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        if let Some(sinks) = topics.get_mut(&handle.topic) {
            let before = sinks.len();
            sinks.retain(|(id, _)| *id != handle.id);
            return sinks.len() != before;
        }
        false
    }

    /// Register a broadcast-channel-backed sink and hand back the receiver.
    ///
    /// This is the collaborator attachment point: the receiver side can live
    /// on another task and lag without affecting publication.
    pub fn channel(&self, topic: impl Into<String>, capacity: usize) -> broadcast::Receiver<InternalEvent> {
        let (tx, rx) = broadcast::channel(capacity);
        self.subscribe(topic, Arc::new(ChannelSink { tx }));
        rx
    }

    /// Deliver `event` to every sink registered under `topic`, in
    /// registration order. A failing sink is logged and skipped; publication
    /// itself never fails.
    pub fn publish(&self, topic: &str, event: &InternalEvent) {
        // Snapshot the sink list so slow sinks don't hold the registry lock
        // and re-entrant subscribe calls can't deadlock.
        let sinks: Vec<(u64, Arc<dyn EventSink>)> = {
            let topics = self.topics.lock().expect("bus lock poisoned");
            match topics.get(topic) {
                Some(sinks) => sinks.clone(),
                None => return,
            }
        };

        for (id, sink) in sinks {
            if let Err(e) = sink.on_event(event) {
                tracing::warn!(topic, id, error = %e, "sink failed; continuing");
            }
        }
    }

    /// Number of sinks currently registered under `topic`.
    pub fn sink_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .expect("bus lock poisoned")
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Drop every registered sink.
    pub fn clear(&self) {
        self.topics.lock().expect("bus lock poisoned").clear();
        tracing::debug!("bus cleared");
    }
}

// ---------------------------------------------------------------------------
// Channel adapter
// ---------------------------------------------------------------------------

/// Bridges the sink interface onto a tokio broadcast channel.
struct ChannelSink {
    tx: broadcast::Sender<InternalEvent>,
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: &InternalEvent) -> Result<(), SinkError> {
        // Zero receivers is not a failure; the consumer may attach later or
        // have gone away.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
