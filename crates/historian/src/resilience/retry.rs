use std::time::Duration;

use canary_core::config::ResilienceConfig;
use rand::Rng;

/// Exponential backoff with additive jitter, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter_ms: config.retry_jitter_ms,
        }
    }

    /// Delay before retry number `attempt` (0 = first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let base = self.base_delay.saturating_mul(factor);
        let jitter = if self.jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(1_000),
            jitter_ms,
        }
    }

    #[test]
    fn delays_double_until_capped() {
        let p = policy(0);
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(1_000));
        assert_eq!(p.delay_for_attempt(40), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(50);
        for _ in 0..100 {
            let d = p.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(250));
        }
    }
}
