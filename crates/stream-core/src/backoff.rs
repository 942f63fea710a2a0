//! Exponential reconnect backoff.

use std::time::Duration;

/// Doubling backoff with a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `base` and never exceeding `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Delay the next failure will wait.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure: return the delay to wait now and double the next.
    pub fn fail(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Record a success: back to the base delay.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_then_resets() {
        let base = Duration::from_millis(1000);
        let mut backoff = Backoff::new(base, Duration::from_secs(300));
        assert_eq!(backoff.current(), base);

        assert_eq!(backoff.fail(), Duration::from_millis(1000));
        assert_eq!(backoff.fail(), Duration::from_millis(2000));
        assert_eq!(backoff.fail(), Duration::from_millis(4000));
        assert_eq!(backoff.current(), Duration::from_millis(8000));

        backoff.reset();
        assert_eq!(backoff.current(), base);
    }

    #[test]
    fn test_respects_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.fail().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_ceiling_below_base() {
        let mut backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(backoff.fail(), Duration::from_secs(3));
    }
}
