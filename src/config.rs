//! Initial client configuration.
//!
//! Loading from disk is the caller's concern; this module only defines the
//! configuration shape and client-side validation. Every field deserializes
//! with `serde`, so a caller can feed it from JSON, TOML, or build it in
//! code — the `stream_check` binary assembles one from environment variables.
//!
//! # Required fields
//! - `base_url` — upstream endpoint; `ws`/`wss`/`http`/`https` schemes
//!   accepted, HTTP schemes auto-upgraded at dial time
//! - `token` — bearer token; must not be blank
//! - At least one enabled output

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;
use crate::error::{Result, StreamError};
use crate::types::subscription::Channel;

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Exponential-backoff reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling on the retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per fired attempt.
    pub multiplier: f64,
    /// Bound on consecutive attempts; `0` means unbounded.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: constants::RECONNECT_INITIAL_DELAY_MS,
            max_delay_ms: constants::RECONNECT_MAX_DELAY_MS,
            multiplier: constants::RECONNECT_MULTIPLIER,
            max_attempts: constants::RECONNECT_MAX_ATTEMPTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Which consumer topics the orchestrator should feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Terminal renderer.
    pub cli: bool,
    /// Local HTTP dashboard.
    pub dashboard: bool,
    /// Alert webhooks.
    pub alerts: bool,
}

impl OutputsConfig {
    /// Whether any output is enabled.
    pub fn any_enabled(&self) -> bool {
        self.cli || self.dashboard || self.alerts
    }
}

// ---------------------------------------------------------------------------
// Shutdown recovery
// ---------------------------------------------------------------------------

/// How to recover after a server-announced `shutdown` frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum ShutdownRecovery {
    /// Wait a fixed grace period, then dial with a fresh reconnect counter.
    /// This is the default (5 seconds).
    FixedDelay {
        /// Grace period in milliseconds.
        delay_ms: u64,
    },
    /// Poll `GET /health` until the server reports ready, bounded by an
    /// overall deadline. The legacy recovery mode; never enabled implicitly.
    HealthPoll {
        /// Overall deadline in milliseconds.
        deadline_ms: u64,
    },
}

impl Default for ShutdownRecovery {
    fn default() -> Self {
        Self::FixedDelay {
            delay_ms: constants::SHUTDOWN_GRACE.as_millis() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Initial configuration for the streaming client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream endpoint base URL.
    pub base_url: String,
    /// Bearer token, attached as the `token` query parameter on dial.
    pub token: String,
    /// Initial subscription channels.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Initial handle filter. May be empty.
    #[serde(default)]
    pub users: Vec<String>,
    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Dedup suppression window, in seconds.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Post-shutdown recovery strategy.
    #[serde(default)]
    pub shutdown_recovery: ShutdownRecovery,
    /// Enabled consumer topics.
    #[serde(default)]
    pub outputs: OutputsConfig,
}

fn default_dedup_ttl_secs() -> u64 {
    constants::DEDUP_TTL.as_secs()
}

impl Config {
    /// Validate the configuration before any network activity.
    ///
    /// Rejects a blank token, an unparseable base URL, a zero backoff
    /// multiplier, and a configuration with every output disabled.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(StreamError::Auth("token is empty or whitespace".into()));
        }
        url::Url::parse(&self.base_url)?;
        if self.reconnect.multiplier < 1.0 {
            return Err(StreamError::InvalidArgument(format!(
                "reconnect.multiplier must be >= 1.0, got {}",
                self.reconnect.multiplier
            )));
        }
        if self.reconnect.initial_delay_ms == 0 {
            return Err(StreamError::InvalidArgument(
                "reconnect.initial_delay_ms must be > 0".into(),
            ));
        }
        if !self.outputs.any_enabled() {
            return Err(StreamError::InvalidArgument(
                "at least one output must be enabled".into(),
            ));
        }
        Ok(())
    }

    /// The dedup TTL as a [`Duration`].
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }
}
