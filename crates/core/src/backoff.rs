//! Exponential retry backoff with bounded jitter.
//!
//! Kept as a pure function over an injected RNG so retry loops can be
//! tested without sleeping and without flakiness.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the retry backoff curve.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt.
    pub base: Duration,
    /// Upper bound on the random jitter added to every delay. Keeping this
    /// at or below `base` preserves the non-decreasing delay property.
    pub jitter_cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            jitter_cap: Duration::from_millis(250),
        }
    }
}

/// Delay before retrying after the given 1-based failed attempt:
/// `base * 2^(attempt-1)` plus a uniform random jitter in
/// `0..=jitter_cap`.
///
/// `attempt == 0` is treated as 1. The exponential factor saturates rather
/// than overflowing for absurd attempt numbers.
pub fn retry_backoff<R: Rng + ?Sized>(
    attempt: u32,
    config: &BackoffConfig,
    rng: &mut R,
) -> Duration {
    let exponent = attempt.max(1) - 1;
    // 2^30 seconds is already beyond any realistic retry ceiling.
    let factor = 1u32 << exponent.min(30);
    let exponential = config.base.saturating_mul(factor);

    let cap_ms = config.jitter_cap.as_millis() as u64;
    let jitter = Duration::from_millis(rng.random_range(0..=cap_ms));

    exponential.saturating_add(jitter)
}
