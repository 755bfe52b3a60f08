// ── Resync backoff ──

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with additive random jitter.
///
/// `delay(n) = min(base * 2^n, max) + uniform(1ms..=jitter_max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter_max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(300),
            jitter_max: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic part of the delay for retry number `retry_count`.
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    /// Full delay including jitter. Jitter is always at least 1ms.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let ceiling = u64::try_from(self.jitter_max.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let jitter = rand::thread_rng().gen_range(1..=ceiling);
        self.base_delay(retry_count) + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_retry_from_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_secs(60));
        assert_eq!(policy.base_delay(2), Duration::from_secs(120));
        assert_eq!(policy.base_delay(3), Duration::from_secs(240));
    }

    #[test]
    fn caps_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(4), Duration::from_secs(300));
        assert_eq!(policy.base_delay(40), Duration::from_secs(300));
    }

    #[test]
    fn jitter_is_positive_and_bounded() {
        let policy = BackoffPolicy::default();
        for n in 1..8 {
            let delay = policy.delay(n);
            assert!(delay > policy.base_delay(n));
            assert!(delay <= policy.max + policy.jitter_max);
        }
    }

    #[test]
    fn non_decreasing_across_failures() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for n in 1..10 {
            let current = policy.base_delay(n);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn zero_jitter_ceiling_still_jitters() {
        let policy = BackoffPolicy {
            jitter_max: Duration::ZERO,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(60_001));
    }
}
