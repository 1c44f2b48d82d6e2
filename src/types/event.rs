//! The canonical internal event record.
//!
//! Every upstream frame that survives normalization becomes an
//! [`InternalEvent`]: a closed [`EventKind`], a reception timestamp, a stable
//! per-kind [`primary id`](InternalEvent::primary_id), the [`Actor`] identity
//! section, and a deep, independent copy of the upstream `data` subtree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event kind
// ---------------------------------------------------------------------------

/// The normalized category of an event.
///
/// This is a closed set: frames that would normalize to anything else are
/// rejected before publication, so downstream consumers never see an
/// "unknown" kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new post was published.
    PostCreated,
    /// An existing post was edited.
    PostUpdated,
    /// A user followed another user.
    FollowCreated,
    /// An existing follow edge changed.
    FollowUpdated,
    /// Account-level settings changed.
    UserUpdated,
    /// Profile fields (name, bio, avatar) changed.
    ProfileUpdated,
    /// A post was pinned to a profile.
    ProfilePinned,
}

impl EventKind {
    /// Parse a kind from its wire name. Returns `None` for anything outside
    /// the closed set (including `"unknown"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post_created" => Some(Self::PostCreated),
            "post_updated" => Some(Self::PostUpdated),
            "follow_created" => Some(Self::FollowCreated),
            "follow_updated" => Some(Self::FollowUpdated),
            "user_updated" => Some(Self::UserUpdated),
            "profile_updated" => Some(Self::ProfileUpdated),
            "profile_pinned" => Some(Self::ProfilePinned),
            _ => None,
        }
    }

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostCreated => "post_created",
            Self::PostUpdated => "post_updated",
            Self::FollowCreated => "follow_created",
            Self::FollowUpdated => "follow_updated",
            Self::UserUpdated => "user_updated",
            Self::ProfileUpdated => "profile_updated",
            Self::ProfilePinned => "profile_pinned",
        }
    }

    /// Whether this is a follow-edge kind (composite primary id).
    pub fn is_follow(&self) -> bool {
        matches!(self, Self::FollowCreated | Self::FollowUpdated)
    }

    /// Whether this is a post kind (tweet-id-derived primary id).
    pub fn is_post(&self) -> bool {
        matches!(self, Self::PostCreated | Self::PostUpdated)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The identity section of an internal event.
///
/// `handle` is case-preserved for display; user-filter matching lowercases
/// it at comparison time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Public user-name identifier, without the `@`.
    pub handle: String,
    /// Display name; falls back to `handle` when the profile carries none.
    pub display_name: String,
    /// Upstream user id; `"unknown"` when the frame carries none.
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Internal event
// ---------------------------------------------------------------------------

/// The pipeline's canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalEvent {
    /// Normalized event category.
    pub kind: EventKind,
    /// Wall-clock of reception, ISO-8601 UTC with millisecond precision.
    pub timestamp: String,
    /// Stable per-kind identifier derived by the normalizer.
    pub primary_id: String,
    /// Identity of the user the event is about.
    pub actor: Actor,
    /// Deep, independent copy of the upstream record's `data` subtree.
    pub payload: Value,
}

impl InternalEvent {
    /// The string used to index the dedup cache.
    ///
    /// `kind|primary_id` suffices because the primary-id derivation already
    /// encodes the content-distinguishing information per kind.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}", self.kind.as_str(), self.primary_id)
    }

    /// Text surfaces for keyword matching: the tweet text when present,
    /// otherwise the display name plus any bio/description strings.
    pub fn search_texts(&self) -> Vec<&str> {
        let mut texts = Vec::new();

        for path in [
            &["tweet", "body", "text"][..],
            &["tweet", "text"][..],
            &["text"][..],
        ] {
            if let Some(s) = lookup_str(&self.payload, path) {
                texts.push(s);
            }
        }

        if texts.is_empty() {
            texts.push(self.actor.display_name.as_str());
            for path in [
                &["user", "profile", "bio"][..],
                &["user", "profile", "description"][..],
                &["tweet", "author", "profile", "bio"][..],
            ] {
                if let Some(s) = lookup_str(&self.payload, path) {
                    texts.push(s);
                }
            }
        }

        texts
    }
}

/// Walk `path` through nested JSON objects and return the string at the end,
/// if there is a non-empty one.
pub(crate) fn lookup_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    match cur.as_str() {
        Some(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}
