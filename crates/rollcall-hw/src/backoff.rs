//! Exponential retry backoff with optional full jitter.

use rand::Rng;
use std::time::Duration;

/// Delay schedule for consecutive acquisition failures.
///
/// The n-th consecutive failure waits `min(base * 2^(n-1), max)`; with jitter
/// the wait is drawn uniformly from `[0, that]`. `reset()` after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: true,
            failures: 0,
        }
    }

    /// Deterministic schedule (tests, or callers that want exact delays).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.failures.min(31);
        self.failures = self.failures.saturating_add(1);

        let ceiling = self
            .base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max));

        if self.jitter && !ceiling.is_zero() {
            let ms = ceiling.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
        } else {
            ceiling
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
