//! Reconnect pacing.

use rand::Rng;
use std::time::{Duration, Instant};

/// Spread of each gap around the configured spacing, as a fraction.
const JITTER: f64 = 0.2;

/// Spaces connection attempts roughly `spacing` apart, however quickly
/// they fail. Each gap is jittered so sessions that lost the same server
/// do not all come back at once.
#[derive(Debug)]
pub struct Backoff {
    spacing: Duration,
    /// Gap chosen at the last attempt.
    gap: Duration,
    last_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            gap: spacing,
            last_attempt: None,
        }
    }

    /// How long to wait before the next attempt may start.
    pub fn delay(&self, now: Instant) -> Duration {
        match self.last_attempt {
            Some(last) => (last + self.gap).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    pub fn attempt(&mut self, now: Instant) {
        let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
        self.gap = self.spacing.mul_f64(factor);
        self.last_attempt = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(spacing: Duration) -> (Duration, Duration) {
        (spacing.mul_f64(1.0 - JITTER), spacing.mul_f64(1.0 + JITTER))
    }

    #[test]
    fn test_first_attempt_is_immediate() {
        let backoff = Backoff::new(Duration::from_secs(5));
        assert_eq!(backoff.delay(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_attempts_are_spaced() {
        let start = Instant::now();
        let mut backoff = Backoff::new(Duration::from_secs(5));
        backoff.attempt(start);

        let (low, high) = bounds(Duration::from_secs(5));
        let delay = backoff.delay(start);
        assert!(delay >= low && delay <= high, "{delay:?}");
        assert_eq!(
            backoff.delay(start + Duration::from_secs(2)),
            delay - Duration::from_secs(2)
        );
        assert_eq!(backoff.delay(start + Duration::from_secs(9)), Duration::ZERO);
    }

    #[test]
    fn test_gaps_are_jittered() {
        let start = Instant::now();
        let mut backoff = Backoff::new(Duration::from_secs(10));
        let (low, high) = bounds(Duration::from_secs(10));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            backoff.attempt(start);
            let delay = backoff.delay(start);
            assert!(delay >= low && delay <= high, "{delay:?}");
            seen.insert(delay);
        }
        assert!(seen.len() > 1);
    }
}
