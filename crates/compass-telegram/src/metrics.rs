use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide polling counters, incremented once per poll cycle.
#[derive(Debug, Default)]
pub struct PollingMetrics {
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl PollingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns (success, failure) after recording one success.
    pub fn record_success(&self) -> (u64, u64) {
        let success = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        (success, self.failure_count.load(Ordering::Relaxed))
    }

    /// Returns (success, failure) after recording one failure.
    pub fn record_failure(&self) -> (u64, u64) {
        let failure = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        (self.success_count.load(Ordering::Relaxed), failure)
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.success_count.load(Ordering::Relaxed),
            self.failure_count.load(Ordering::Relaxed),
        )
    }
}
