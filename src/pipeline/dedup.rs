//! TTL-bounded deduplication cache.
//!
//! Keys are event fingerprints; deadlines are monotonic
//! [`Instant`](std::time::Instant)s, never wall-clock. Entries expire lazily
//! when probed and eagerly on a background sweeper, so the map stays bounded
//! even when fingerprints never repeat.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Bounded-time suppression cache, safe for concurrent pipeline stages.
pub struct DedupCache {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DedupCache {
    /// A cache with lazy expiry only (no background task).
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Mutex::new(None),
        }
    }

    /// A cache with an eager sweeper that evicts expired entries every
    /// `interval`. Must be called from within a tokio runtime; the sweeper
    /// stops on [`stop`](Self::stop) or drop.
    pub fn with_sweeper(interval: Duration) -> Self {
        let cache = Self::new();
        cache.spawn_sweeper(interval);
        cache
    }

    /// Start the eager sweeper on an existing cache. A no-op when one is
    /// already running. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let mut sweeper = self.sweeper.lock().expect("sweeper lock poisoned");
        if sweeper.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let entries = self.entries.clone();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut map = entries.lock().expect("dedup lock poisoned");
                let before = map.len();
                map.retain(|_, deadline| *deadline > now);
                let evicted = before - map.len();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = map.len(), "dedup sweep");
                }
            }
        }));
    }

    /// Whether `key` was added within its TTL. A probe that finds an expired
    /// entry removes it and reports absent.
    pub fn has(&self, key: &str) -> bool {
        let mut map = self.entries.lock().expect("dedup lock poisoned");
        match map.get(key) {
            Some(deadline) if *deadline > Instant::now() => true,
            Some(_) => {
                map.remove(key);
                false
            }
            None => false,
        }
    }

    /// Record `key` with the given suppression window. Re-adding an existing
    /// key extends its deadline.
    pub fn add(&self, key: String, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .expect("dedup lock poisoned")
            .insert(key, deadline);
    }

    /// Number of entries currently held (including not-yet-swept expired
    /// ones).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweeper task, if one is running.
    pub fn stop(&self) {
        if let Some(task) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            task.abort();
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DedupCache {
    fn drop(&mut self) {
        self.stop();
    }
}
