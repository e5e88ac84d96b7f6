//! Apply engine configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Apply engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Provider calls in flight at once within a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ApplyConfig {
    /// Set the worker pool size; zero is treated as one
    #[must_use]
    pub const fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub const fn with_call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Worker pool size actually used
    #[must_use]
    pub fn workers(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Per-call timeout
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
