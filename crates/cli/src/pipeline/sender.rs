//! Downstream sender used by the `run` command.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{BatchSender, CallContext, ContractError, RecordBatch, Request};
use dispatcher::LogSender;
use observability::FlushStatsAggregator;
use parking_lot::Mutex;

/// Wraps a [`LogSender`] with a fixed per-batch delay and records every send
pub struct LatencySender {
    inner: LogSender<RecordBatch>,
    latency: Duration,
    stats: Arc<Mutex<FlushStatsAggregator>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl LatencySender {
    pub fn new(name: impl Into<String>, latency: Duration) -> Self {
        Self {
            inner: LogSender::new(name),
            latency,
            stats: Arc::new(Mutex::new(FlushStatsAggregator::new())),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Shared handle to the send statistics
    pub fn stats(&self) -> Arc<Mutex<FlushStatsAggregator>> {
        Arc::clone(&self.stats)
    }

    /// Highest number of sends observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl BatchSender for LatencySender {
    type Request = RecordBatch;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, ctx: &CallContext, batch: RecordBatch) -> Result<(), ContractError> {
        let started = Instant::now();
        let items = batch.items_count();

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.inner.send(ctx, batch).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.lock().update(
            items,
            started.elapsed().as_secs_f64() * 1000.0,
            result.is_ok(),
        );
        result
    }
}
