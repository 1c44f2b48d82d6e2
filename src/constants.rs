//! Default tunables for the streaming client.
//!
//! These are used internally by [`StreamTransport`](crate::ws::transport::StreamTransport)
//! and the pipeline components, but are also exported so operators can mirror
//! them in external configuration.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Handshake & shutdown
// ---------------------------------------------------------------------------

/// How long to wait for the server's `subscribed` confirmation after a dial
/// before closing the socket and retrying.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed grace period after a server-announced `shutdown` before dialing
/// again with a fresh reconnect counter.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Overall deadline for the optional `/health` readiness poll used by the
/// legacy shutdown-recovery strategy.
pub const HEALTH_POLL_DEADLINE: Duration = Duration::from_secs(30);

/// Interval between `/health` probes while the readiness poll is active.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

/// Default delay before the first reconnect attempt.
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 1_000;

/// Ceiling on the reconnect delay.
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Multiplier applied per attempt.
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

/// Default bound on reconnect attempts. `0` means unbounded.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 0;

// ---------------------------------------------------------------------------
// Runtime updates & dedup
// ---------------------------------------------------------------------------

/// Default deadline for a runtime `update()` round-trip.
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time window within which an identical fingerprint is suppressed.
pub const DEDUP_TTL: Duration = Duration::from_secs(60);

/// How often the dedup sweeper evicts expired entries.
pub const DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Channel capacities
// ---------------------------------------------------------------------------

/// Capacity of the inbound frame channel between the transport read loop and
/// the pipeline task.
pub const FRAME_CHANNEL_CAPACITY: usize = 1_024;

/// Capacity of the error-observer broadcast channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the optional raw-frame tap broadcast channel.
pub const RAW_CHANNEL_CAPACITY: usize = 1_024;

// ---------------------------------------------------------------------------
// Bus topics
// ---------------------------------------------------------------------------

/// Topic names the orchestrator publishes to, in publication order.
pub mod topics {
    /// Terminal renderer topic.
    pub const CLI: &str = "cli";
    /// Local dashboard topic.
    pub const DASHBOARD: &str = "dashboard";
    /// Alert-webhook topic.
    pub const ALERTS: &str = "alerts";
}
