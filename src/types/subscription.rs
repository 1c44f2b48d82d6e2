//! Subscription channels and the committed subscription state.
//!
//! The state here is what the transport re-subscribes from after every
//! (re-)connect: seeded from configuration, atomically replaced by a
//! successful runtime update, never changed by a failed one.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::types::now_millis_iso;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A subscription scope advertised to the upstream actor.
///
/// Distinct from a bus topic: channels scope what the *server* sends,
/// topics scope where the *client* delivers.
///
/// Variants are declared in wire-name order so the derived `Ord` sorts a
/// normalized channel list the same way the server renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Every event category. When present, it is the sole element.
    All,
    /// Follow-edge events.
    Following,
    /// Profile and account events.
    Profile,
    /// Post creation/edit events.
    Tweets,
}

impl Channel {
    /// Parse a channel from its wire name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "tweets" => Ok(Self::Tweets),
            "following" => Ok(Self::Following),
            "profile" => Ok(Self::Profile),
            other => Err(StreamError::InvalidArgument(format!(
                "invalid channel {other:?}; expected one of all, tweets, following, profile"
            ))),
        }
    }

    /// The wire name of this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Tweets => "tweets",
            Self::Following => "following",
            Self::Profile => "profile",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a channel list: `all` collapses to the sole element; otherwise
/// duplicates are removed and the rest sorted.
pub fn normalize_channels(channels: &[Channel]) -> Vec<Channel> {
    if channels.contains(&Channel::All) {
        return vec![Channel::All];
    }
    let mut out: Vec<Channel> = channels.to_vec();
    out.sort();
    out.dedup();
    out
}

/// Normalize a user list: trim, lowercase, drop empties, dedupe, sort.
pub fn normalize_users<S: AsRef<str>>(users: &[S]) -> Vec<String> {
    let mut out: Vec<String> = users
        .iter()
        .map(|u| u.as_ref().trim().to_lowercase())
        .filter(|u| !u.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

// ---------------------------------------------------------------------------
// Subscription state
// ---------------------------------------------------------------------------

/// Whether the subscription currently covers anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// At least one channel is subscribed.
    Active,
    /// The channel list is empty; the server sends nothing.
    Idle,
}

/// Where the current subscription values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionSource {
    /// Seeded from the initial configuration.
    Config,
    /// Last set by a successful runtime update.
    Runtime,
}

/// The committed subscription: what a (re-)connect subscribes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Ordered channel set; `[all]` when `all` is requested.
    pub channels: Vec<Channel>,
    /// Lowercased, sorted, deduplicated handle filter. May be empty.
    pub users: Vec<String>,
    /// Provenance of the current values.
    pub source: SubscriptionSource,
    /// ISO-8601 timestamp of the most recent accepted change.
    pub updated_at: String,
}

impl SubscriptionState {
    /// Seed the state from initial configuration values.
    pub fn from_config(channels: &[Channel], users: &[String]) -> Self {
        Self {
            channels: normalize_channels(channels),
            users: normalize_users(users),
            source: SubscriptionSource::Config,
            updated_at: now_millis_iso(),
        }
    }

    /// Replace the committed values after a confirmed runtime update.
    /// Inputs must already be normalized.
    pub fn commit_runtime(&mut self, channels: Vec<Channel>, users: Vec<String>) {
        self.channels = channels;
        self.users = users;
        self.source = SubscriptionSource::Runtime;
        self.updated_at = now_millis_iso();
    }

    /// Derived mode: `Active` iff any channel is subscribed.
    pub fn mode(&self) -> SubscriptionMode {
        if self.channels.is_empty() {
            SubscriptionMode::Idle
        } else {
            SubscriptionMode::Active
        }
    }
}
