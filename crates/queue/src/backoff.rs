//! Backoff curves for the two retry paths.

use std::time::Duration;

use rand::Rng;

/// Base delay for the immediate-send path.
const IMMEDIATE_BASE_MS: u64 = 250;
/// Ceiling for immediate-send delays; the whole window is ~10 s.
const IMMEDIATE_CAP_MS: u64 = 4_000;
/// Base delay for the background drain path.
const DRAIN_BASE_MS: u64 = 5_000;
/// Ceiling for drain delays. The sweep is lazy; big gaps are fine.
const DRAIN_CAP_MS: u64 = 10 * 60 * 1000;
/// Cool-down for records whose payload can never be delivered.
pub const CORRUPT_COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;

fn with_jitter(base_ms: u64) -> u64 {
    // Up to 20% extra, so synchronized retries spread out.
    let jitter_cap = (base_ms / 5).max(1);
    base_ms + rand::rng().random_range(0..jitter_cap)
}

/// Delay before immediate-send attempt `attempt` (1-based).
pub fn immediate_delay(attempt: u32) -> Duration {
    let exp = IMMEDIATE_BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(with_jitter(exp.min(IMMEDIATE_CAP_MS)))
}

/// Drain-path delay after `attempts` failed deliveries of a persisted record.
pub fn drain_delay_ms(attempts: i64) -> u64 {
    let shift = attempts.clamp(0, 16) as u32;
    let exp = DRAIN_BASE_MS.saturating_mul(1u64 << shift);
    with_jitter(exp.min(DRAIN_CAP_MS))
}
