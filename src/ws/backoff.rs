//! Exponential reconnect backoff with a ceiling.
//!
//! The policy is pure arithmetic; the transport's session driver owns the
//! attempt counter and the actual sleeps. The counter increments when a
//! scheduled retry *fires*, not when it is scheduled, and resets to zero on a
//! successful `subscribed` confirmation.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Reconnect delay schedule: `delay(n) = min(initial × multiplier^n, max)`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Build a policy from reconnect configuration.
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
        }
    }

    /// The delay before the retry that would be attempt `attempt` (0-based).
    ///
    /// Never exceeds the configured ceiling, including when the exponent
    /// overflows `f64` range.
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_millis() as f64 * self.multiplier.powf(f64::from(attempt));
        if !scaled.is_finite() || scaled >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(scaled as u64)
        }
    }

    /// Whether the attempt counter has used up the configured budget.
    /// A budget of `0` means unbounded.
    pub fn exhausted(&self, fired_attempts: u32) -> bool {
        self.max_attempts > 0 && fired_attempts >= self.max_attempts
    }

    /// The configured attempt bound (`0` = unbounded).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
