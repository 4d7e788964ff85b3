//! Capped exponential retry backoff with jitter.

use std::time::Duration;

use rand::RngExt;

/// Backoff policy for dispatch retries.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    /// Maximum dispatch attempts per unit before giving up.
    pub max_attempts: u32,
    /// First-retry delay.
    pub base: Duration,
    /// Multiplier per attempt.
    pub factor: f64,
    /// Upper bound on any delay.
    pub cap: Duration,
    /// Jitter fraction (`0.25` = ±25 %).
    pub jitter: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryBackoff {
    /// Whether another attempt is permitted after `attempt` tries.
    #[must_use]
    pub fn attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// The deterministic (un-jittered) delay before retry `attempt`
    /// (0-based: attempt 0 → base).
    #[must_use]
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.factor.powi(attempt.min(32) as i32);
        Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }

    /// The jittered delay before retry `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt).as_secs_f64();
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(raw);
        }
        let spread = raw * self.jitter;
        let jittered = rand::rng().random_range(raw - spread..=raw + spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_delay_doubles_until_cap() {
        let backoff = RetryBackoff::default();
        assert_eq!(backoff.raw_delay(0), Duration::from_millis(500));
        assert_eq!(backoff.raw_delay(1), Duration::from_secs(1));
        assert_eq!(backoff.raw_delay(2), Duration::from_secs(2));
        assert_eq!(backoff.raw_delay(10), Duration::from_secs(30)); // capped
    }

    #[test]
    fn attempts_capped() {
        let backoff = RetryBackoff::default();
        assert!(backoff.attempts_left(0));
        assert!(backoff.attempts_left(4));
        assert!(!backoff.attempts_left(5));
        assert!(!backoff.attempts_left(6));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let backoff = RetryBackoff::default();
        let raw = backoff.raw_delay(2).as_secs_f64();
        for _ in 0..100 {
            let delay = backoff.delay(2).as_secs_f64();
            assert!(delay >= raw * 0.75 - 1e-9);
            assert!(delay <= raw * 1.25 + 1e-9);
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let backoff = RetryBackoff {
            jitter: 0.0,
            ..RetryBackoff::default()
        };
        assert_eq!(backoff.delay(3), backoff.raw_delay(3));
    }
}
