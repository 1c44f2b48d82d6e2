//! Reconnect backoff schedule properties.

use std::time::Duration;

use alpha_stream::config::ReconnectConfig;
use alpha_stream::ws::backoff::BackoffPolicy;

fn policy(initial_ms: u64, max_ms: u64, multiplier: f64, max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy::new(&ReconnectConfig {
        initial_delay_ms: initial_ms,
        max_delay_ms: max_ms,
        multiplier,
        max_attempts,
    })
}

#[test]
fn delay_follows_formula_until_ceiling() {
    let p = policy(1_000, 30_000, 2.0, 0);
    assert_eq!(p.delay(0), Duration::from_millis(1_000));
    assert_eq!(p.delay(1), Duration::from_millis(2_000));
    assert_eq!(p.delay(2), Duration::from_millis(4_000));
    assert_eq!(p.delay(3), Duration::from_millis(8_000));
    assert_eq!(p.delay(4), Duration::from_millis(16_000));
    // 32 s exceeds the ceiling
    assert_eq!(p.delay(5), Duration::from_millis(30_000));
    assert_eq!(p.delay(6), Duration::from_millis(30_000));
}

#[test]
fn delay_never_exceeds_max_for_any_attempt() {
    let configs = [
        (500u64, 10_000u64, 1.5f64),
        (1_000, 30_000, 2.0),
        (100, 100, 3.0),
        (2_000, 60_000, 10.0),
    ];
    for (initial, max, multiplier) in configs {
        let p = policy(initial, max, multiplier, 0);
        for attempt in 0..64 {
            let d = p.delay(attempt);
            assert!(
                d <= Duration::from_millis(max),
                "delay({attempt}) = {d:?} exceeds max {max}ms for initial={initial} multiplier={multiplier}"
            );
            let expected = (initial as f64 * multiplier.powf(f64::from(attempt)))
                .min(max as f64) as u64;
            assert_eq!(d, Duration::from_millis(expected));
        }
    }
}

#[test]
fn huge_attempt_counts_saturate_at_ceiling() {
    let p = policy(1_000, 30_000, 2.0, 0);
    // Large exponents overflow f64 toward infinity; the ceiling must hold.
    assert_eq!(p.delay(u32::MAX), Duration::from_millis(30_000));
}

#[test]
fn multiplier_one_keeps_delay_constant() {
    let p = policy(750, 30_000, 1.0, 0);
    for attempt in 0..10 {
        assert_eq!(p.delay(attempt), Duration::from_millis(750));
    }
}

#[test]
fn zero_max_attempts_is_unbounded() {
    let p = policy(1_000, 30_000, 2.0, 0);
    assert!(!p.exhausted(0));
    assert!(!p.exhausted(1_000_000));
}

#[test]
fn bounded_attempts_exhaust_at_the_limit() {
    let p = policy(1_000, 30_000, 2.0, 3);
    assert!(!p.exhausted(0));
    assert!(!p.exhausted(2));
    assert!(p.exhausted(3));
    assert!(p.exhausted(4));
    assert_eq!(p.max_attempts(), 3);
}
