//! Bounded exponential backoff for transient provider failures.

use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for provider calls
///
/// The delay before retry `n` (1-based) is
/// `min(base_delay_ms * multiplier^(n-1), max_delay_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Set total attempts
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the first delay
    #[must_use]
    pub const fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub const fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Whether to retry after `attempts` calls ended with `error`
    #[must_use]
    pub fn should_retry(&self, error: &ProviderError, attempts: u32) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(retry.saturating_sub(1));
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorClass;
    use proptest::prelude::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=4).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600]);
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::default().with_max_delay_ms(500);
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(60), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_only_transient_within_budget() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        let transient = ProviderError::transient("throttled");
        assert!(policy.should_retry(&transient, 1));
        assert!(policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&transient, 3));

        for class in [ErrorClass::PermissionDenied, ErrorClass::Conflict, ErrorClass::NotFound, ErrorClass::Unknown] {
            assert!(!policy.should_retry(&ProviderError::new(class, "x"), 1));
        }
    }

    #[test]
    fn test_none_never_retries() {
        assert!(!RetryPolicy::none().should_retry(&ProviderError::transient("x"), 1));
    }

    #[test]
    fn test_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 200);
        assert_eq!(policy.multiplier, 2);
    }

    proptest! {
        #[test]
        fn prop_delays_monotonic_and_bounded(
            base in 1u64..1_000,
            cap in 1u64..100_000,
            multiplier in 1u32..5,
        ) {
            let policy = RetryPolicy::default()
                .with_base_delay_ms(base)
                .with_max_delay_ms(cap)
                .with_multiplier(multiplier);
            let mut previous = Duration::ZERO;
            for retry in 1..40 {
                let delay = policy.delay_for(retry);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_millis(cap));
                previous = delay;
            }
        }
    }
}
