//! Apply metrics.
//!
//! Counters are shared with worker tasks and updated without locking;
//! [`ApplyMonitor::snapshot`] reads them into a plain [`ApplyMetrics`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyMetrics {
    /// Provider calls made, retries included
    pub calls: u64,
    /// Calls that were retries
    pub retries: u64,
    /// Calls that hit the per-call timeout
    pub timeouts: u64,
    /// Resources created or updated
    pub applied: u64,
    /// Resources that failed
    pub failed: u64,
    /// Resources carried over from a previous run
    pub reused: u64,
    /// Resources deleted
    pub deleted: u64,
}

impl ApplyMetrics {
    /// Get success rate (0.0 - 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let finished = self.applied + self.failed;
        if finished == 0 {
            return 1.0;
        }
        self.applied as f64 / finished as f64
    }
}

/// Shared metric counters
#[derive(Debug, Default)]
pub struct ApplyMonitor {
    calls: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    reused: AtomicU64,
    deleted: AtomicU64,
}

impl ApplyMonitor {
    /// Create a new monitor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provider call
    pub fn record_call(&self, attempt: u32) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a call timeout
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied resource
    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed resource
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resource reused from a previous run
    pub fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a deleted resource
    pub fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    #[must_use]
    pub fn snapshot(&self) -> ApplyMetrics {
        ApplyMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.calls,
            &self.retries,
            &self.timeouts,
            &self.applied,
            &self.failed,
            &self.reused,
            &self.deleted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let monitor = ApplyMonitor::new();
        monitor.record_call(1);
        monitor.record_call(2);
        monitor.record_call(3);
        monitor.record_applied();
        monitor.record_failure();

        let m = monitor.snapshot();
        assert_eq!(m.calls, 3);
        assert_eq!(m.retries, 2);
        assert_eq!(m.success_rate(), 0.5);
    }

    #[test]
    fn test_reset() {
        let monitor = ApplyMonitor::new();
        monitor.record_call(1);
        monitor.record_deleted();
        monitor.reset();
        assert_eq!(monitor.snapshot(), ApplyMetrics::default());
    }

    #[test]
    fn test_empty_success_rate() {
        assert_eq!(ApplyMetrics::default().success_rate(), 1.0);
    }
}
