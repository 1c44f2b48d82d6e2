//! Predicate filters applied between normalization and dedup.
//!
//! A [`FilterChain`] is an ordered list of [`EventFilter`]s; an event is
//! delivered iff every filter accepts it. Each filter's configuration can be
//! swapped at runtime; swaps are atomic with respect to publication (a given
//! event sees either the old set or the new one, never a mix).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::types::event::{EventKind, InternalEvent};

// ---------------------------------------------------------------------------
// Filter trait & chain
// ---------------------------------------------------------------------------

/// A single accept/reject predicate over internal events.
pub trait EventFilter: Send + Sync {
    /// Name used in debug logs when this filter rejects an event.
    fn name(&self) -> &'static str;
    /// Whether the event passes this filter.
    fn accept(&self, event: &InternalEvent) -> bool;
}

/// Ordered conjunction of filters.
#[derive(Default, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn EventFilter>>,
}

impl FilterChain {
    /// An empty chain, which accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain.
    pub fn push(&mut self, filter: Arc<dyn EventFilter>) {
        self.filters.push(filter);
    }

    /// Apply every filter in order; the event passes iff all accept.
    pub fn accept(&self, event: &InternalEvent) -> bool {
        for filter in &self.filters {
            if !filter.accept(event) {
                tracing::debug!(
                    filter = filter.name(),
                    kind = %event.kind,
                    handle = %event.actor.handle,
                    "event filtered"
                );
                return false;
            }
        }
        true
    }

    /// Number of installed filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// User filter
// ---------------------------------------------------------------------------

/// Accepts events whose actor handle is in the configured set,
/// case-insensitively. An empty set accepts everything.
pub struct UserFilter {
    users: RwLock<HashSet<String>>,
}

impl UserFilter {
    /// Build from any iterable of handles; stored lowercased.
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            users: RwLock::new(Self::fold(users)),
        }
    }

    /// Replace the configured set. Atomic with respect to publication.
    pub fn set_users<I, S>(&self, users: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.users.write().expect("user filter lock poisoned") = Self::fold(users);
    }

    fn fold<I, S>(users: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        users
            .into_iter()
            .map(|u| u.as_ref().trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

impl EventFilter for UserFilter {
    fn name(&self) -> &'static str {
        "user"
    }

    fn accept(&self, event: &InternalEvent) -> bool {
        let users = self.users.read().expect("user filter lock poisoned");
        // Handles are case-preserved for display but matched lowercased.
        users.is_empty() || users.contains(&event.actor.handle.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Keyword filter
// ---------------------------------------------------------------------------

/// Accepts events whose text surface contains any configured keyword as a
/// case-folded substring (OR across keywords). An empty list accepts
/// everything.
pub struct KeywordFilter {
    keywords: RwLock<Vec<String>>,
}

impl KeywordFilter {
    /// Build from any iterable of keywords; stored lowercased.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: RwLock::new(Self::fold(keywords)),
        }
    }

    /// Replace the configured keywords. Atomic with respect to publication.
    pub fn set_keywords<I, S>(&self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.keywords.write().expect("keyword filter lock poisoned") = Self::fold(keywords);
    }

    fn fold<I, S>(keywords: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

impl EventFilter for KeywordFilter {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn accept(&self, event: &InternalEvent) -> bool {
        let keywords = self.keywords.read().expect("keyword filter lock poisoned");
        if keywords.is_empty() {
            return true;
        }
        let surfaces: Vec<String> = event
            .search_texts()
            .into_iter()
            .map(str::to_lowercase)
            .collect();
        keywords
            .iter()
            .any(|kw| surfaces.iter().any(|text| text.contains(kw)))
    }
}

// ---------------------------------------------------------------------------
// Kind filter
// ---------------------------------------------------------------------------

/// Accepts events whose kind is in the allowed set. An empty set accepts
/// everything, which is the default — consumers that want kind scoping
/// inside the pipeline configure it through
/// [`AlphaStream::set_kind_filter`](crate::orchestrator::AlphaStream::set_kind_filter).
pub struct KindFilter {
    allowed: RwLock<HashSet<EventKind>>,
}

impl KindFilter {
    /// Build from an iterable of allowed kinds.
    pub fn new<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = EventKind>,
    {
        Self {
            allowed: RwLock::new(kinds.into_iter().collect()),
        }
    }

    /// Replace the allowed set. Atomic with respect to publication.
    pub fn set_kinds<I>(&self, kinds: I)
    where
        I: IntoIterator<Item = EventKind>,
    {
        *self.allowed.write().expect("kind filter lock poisoned") = kinds.into_iter().collect();
    }
}

impl EventFilter for KindFilter {
    fn name(&self) -> &'static str {
        "kind"
    }

    fn accept(&self, event: &InternalEvent) -> bool {
        let allowed = self.allowed.read().expect("kind filter lock poisoned");
        allowed.is_empty() || allowed.contains(&event.kind)
    }
}
