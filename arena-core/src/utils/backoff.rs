use std::time::Duration;

/// Exponential backoff: `base * 2^retry`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Bounded retry budget for an operation that fails transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, backoff: Backoff) -> Self {
        Self { attempts, backoff }
    }

    /// A single attempt, no retries.
    pub const fn once() -> Self {
        Self::new(1, Backoff::new(Duration::ZERO, Duration::ZERO))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_calculation() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(2048));
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(10), Duration::from_secs(1024));
        assert_eq!(backoff.delay(11), Duration::from_secs(2048));
        // Capped
        assert_eq!(backoff.delay(12), Duration::from_secs(2048));
        assert_eq!(backoff.delay(100), Duration::from_secs(2048));
    }

    #[test]
    fn test_sub_second_base() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_millis(250));
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_secs(1));
    }
}
