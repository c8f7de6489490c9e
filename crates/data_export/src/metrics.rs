//! Export metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::ExportResult;
use serde::Serialize;

/// Counters of a single export engine
#[derive(Debug, Default)]
pub struct ExportMetrics {
    /// Submissions on an enabled channel
    submitted: AtomicU64,
    /// Submissions skipped because the channel was disabled
    not_submitted: AtomicU64,
    /// Operations accepted by the transport
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    denied: AtomicU64,
    /// InvalidParam / DataTooLarge
    rejected: AtomicU64,
    /// Bounded waits that hit their deadline
    timeouts: AtomicU64,
    /// Futures whose transport state was released
    released: AtomicU64,
    /// Completions with no matching registry entry
    orphan_callbacks: AtomicU64,
}

impl ExportMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_submitted(&self) -> u64 {
        self.not_submitted.load(Ordering::Relaxed)
    }

    pub fn inc_not_submitted(&self) {
        self.not_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn inc_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn orphan_callbacks(&self) -> u64 {
        self.orphan_callbacks.load(Ordering::Relaxed)
    }

    pub fn inc_orphan_callbacks(&self) {
        self.orphan_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a terminal result
    pub fn record_result(&self, result: ExportResult) {
        let counter = match result {
            ExportResult::Success => &self.succeeded,
            ExportResult::Failure => &self.failed,
            ExportResult::Denied => &self.denied,
            ExportResult::InvalidParam | ExportResult::DataTooLarge => &self.rejected,
            ExportResult::Uninitialized | ExportResult::Enqueued | ExportResult::Timeout => {
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> ExportMetricsSnapshot {
        ExportMetricsSnapshot {
            submitted: self.submitted(),
            not_submitted: self.not_submitted(),
            dispatched: self.dispatched(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts(),
            released: self.released(),
            orphan_callbacks: self.orphan_callbacks(),
        }
    }
}

/// Snapshot of export metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportMetricsSnapshot {
    pub submitted: u64,
    pub not_submitted: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub denied: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub released: u64,
    pub orphan_callbacks: u64,
}
