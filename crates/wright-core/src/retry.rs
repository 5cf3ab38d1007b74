//! Bounded retry with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

/// How many times to retry, and how long to wait between external-call
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_max: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retry_max.saturating_add(1)
    }

    /// Whether another attempt may follow the (zero-based) `attempt`.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.retry_max
    }

    /// Deterministic part of the delay after the zero-based `attempt`:
    /// `base * 2^attempt`, capped at `backoff_max`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Delay with up to 50% random jitter added, still capped at
    /// `backoff_max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let half_ms = (base.as_millis() / 2) as u64;
        let jitter = if half_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=half_ms)
        };
        (base + Duration::from_millis(jitter)).min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        crate::config::PipelineConfig::default().retry_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            retry_max: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(1000),
        }
    }

    #[test]
    fn attempts_include_first_try() {
        assert_eq!(policy().max_attempts(), 4);
        assert!(policy().can_retry(0));
        assert!(policy().can_retry(2));
        assert!(!policy().can_retry(3));
    }

    #[test]
    fn base_delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.base_delay(0), Duration::from_millis(100));
        assert_eq!(p.base_delay(1), Duration::from_millis(200));
        assert_eq!(p.base_delay(3), Duration::from_millis(800));
        assert_eq!(p.base_delay(4), Duration::from_millis(1000));
        assert_eq!(p.base_delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn jittered_delay_stays_in_bounds() {
        let p = policy();
        for attempt in 0..6 {
            let d = p.delay(attempt);
            assert!(d >= p.base_delay(attempt));
            assert!(d <= p.backoff_max);
        }
    }

    #[test]
    fn zero_base_never_sleeps() {
        let p = RetryPolicy {
            backoff_base: Duration::ZERO,
            ..policy()
        };
        assert_eq!(p.delay(2), Duration::ZERO);
    }
}
