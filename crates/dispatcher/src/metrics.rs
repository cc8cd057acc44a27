//! Shard metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single shard
#[derive(Debug, Default)]
pub struct ShardMetrics {
    /// Requests accepted into the shard queue
    enqueued_count: AtomicU64,
    /// Requests completed with an error without being sent
    rejected_count: AtomicU64,
    /// Batches handed to the downstream sender
    batches_flushed: AtomicU64,
    /// Total size flushed, in sizer units
    size_flushed: AtomicU64,
    /// Failed downstream sends
    send_failures: AtomicU64,
}

impl ShardMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get enqueued request count
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    /// Increment enqueued request count
    pub fn inc_enqueued_count(&self) {
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get rejected request count
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// Add to rejected request count
    pub fn add_rejected_count(&self, n: u64) {
        self.rejected_count.fetch_add(n, Ordering::Relaxed);
    }

    /// Get flushed batch count
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Get flushed size
    pub fn size_flushed(&self) -> u64 {
        self.size_flushed.load(Ordering::Relaxed)
    }

    /// Record one flushed batch of `size`
    pub fn record_flush(&self, size: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.size_flushed.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Get send failure count
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Increment send failure count
    pub fn inc_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued_count: self.enqueued_count(),
            rejected_count: self.rejected_count(),
            batches_flushed: self.batches_flushed(),
            size_flushed: self.size_flushed(),
            send_failures: self.send_failures(),
        }
    }
}

/// Snapshot of shard metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued_count: u64,
    pub rejected_count: u64,
    pub batches_flushed: u64,
    pub size_flushed: u64,
    pub send_failures: u64,
}

impl std::ops::Add for MetricsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            enqueued_count: self.enqueued_count + other.enqueued_count,
            rejected_count: self.rejected_count + other.rejected_count,
            batches_flushed: self.batches_flushed + other.batches_flushed,
            size_flushed: self.size_flushed + other.size_flushed,
            send_failures: self.send_failures + other.send_failures,
        }
    }
}
