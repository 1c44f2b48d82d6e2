//! Upstream-frame → internal-event transformation.
//!
//! The normalizer is a pure function over the frame plus a process-wide
//! monotonic counter for synthetic ids. Frames that cannot produce a valid
//! event are dropped with a debug log — a bad frame is never an error.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::types::event::{Actor, EventKind, InternalEvent, lookup_str};
use crate::types::frame::ServerFrame;
use crate::types::now_millis_iso;

/// Transforms raw data frames into [`InternalEvent`]s.
#[derive(Debug, Default)]
pub struct Normalizer {
    /// Monotonic counter feeding synthetic primary ids.
    synthetic: AtomicU64,
}

impl Normalizer {
    /// Create a normalizer with a fresh synthetic-id counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one frame. Returns `None` when the frame is rejected:
    /// unknown kind, unresolvable handle, or a missing identity field.
    pub fn normalize(&self, frame: &ServerFrame) -> Option<InternalEvent> {
        let data = &frame.data;

        // Kind: start from event_type, then let data.action rewrite the
        // update variants.
        let kind_name = match lookup_str(data, &["action"]) {
            Some("follow_update") => "follow_updated",
            Some("post_update") => "post_updated",
            _ => frame.event_type.as_str(),
        };
        let Some(kind) = EventKind::parse(kind_name) else {
            tracing::debug!(event_type = %frame.event_type, "dropping event of unknown kind");
            return None;
        };

        // Identity extraction: first non-empty wins.
        let handle = lookup_str(data, &["username"])
            .or_else(|| lookup_str(data, &["user", "handle"]))
            .or_else(|| lookup_str(data, &["tweet", "author", "handle"]))
            .unwrap_or("unknown");
        if handle == "unknown" {
            tracing::debug!(kind = %kind, "dropping event with unresolvable handle");
            return None;
        }

        let display_name = lookup_str(data, &["user", "profile", "name"])
            .or_else(|| lookup_str(data, &["tweet", "author", "profile", "name"]))
            .unwrap_or(handle);

        let user_id = lookup_str(data, &["user", "id"])
            .or_else(|| lookup_str(data, &["tweet", "author", "id"]))
            .unwrap_or("unknown");

        let primary_id = self.derive_primary_id(kind, data, handle);

        let event = InternalEvent {
            kind,
            timestamp: now_millis_iso(),
            primary_id,
            actor: Actor {
                handle: handle.to_owned(),
                display_name: display_name.to_owned(),
                user_id: user_id.to_owned(),
            },
            // `Value` is an owned tree, so a clone is a structurally deep,
            // independent copy of the upstream subtree.
            payload: data.clone(),
        };

        if let Some(reason) = reject_reason(&event) {
            tracing::debug!(kind = %kind, reason, "dropping invalid event");
            return None;
        }
        Some(event)
    }

    /// Derive the most stable identifier available for this kind.
    fn derive_primary_id(&self, kind: EventKind, data: &Value, handle: &str) -> String {
        if kind.is_follow() {
            if let (Some(user), Some(following)) = (
                lookup_id(data, &["user", "id"]),
                lookup_id(data, &["following", "id"]),
            ) {
                return format!("{user}-{following}");
            }
        }
        if kind.is_post() {
            if let Some(id) =
                lookup_id(data, &["tweetId"]).or_else(|| lookup_id(data, &["tweet", "id"]))
            {
                return id;
            }
            return format!("unknown-{}", self.next_synthetic());
        }
        if let Some(id) = lookup_id(data, &["user", "id"]) {
            return id;
        }
        if let Some(id) = lookup_id(data, &["following", "id"]) {
            return id;
        }
        format!("{handle}-{}", self.next_synthetic())
    }

    fn next_synthetic(&self) -> u64 {
        self.synthetic.fetch_add(1, Ordering::Relaxed)
    }
}

/// Post-assembly validation. Returns the rejection reason, if any.
fn reject_reason(event: &InternalEvent) -> Option<&'static str> {
    if event.actor.handle.is_empty() || event.actor.handle == "unknown" {
        return Some("handle is unknown");
    }
    if event.timestamp.is_empty() {
        return Some("timestamp missing");
    }
    if event.primary_id.is_empty() {
        return Some("primary id missing");
    }
    if event.actor.display_name.is_empty() {
        return Some("display name missing");
    }
    if event.actor.user_id.is_empty() {
        return Some("user id missing");
    }
    None
}

/// An id field: a non-empty string, or a number rendered as one.
fn lookup_id(value: &Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    match cur {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
