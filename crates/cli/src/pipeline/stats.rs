//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::FlushSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Requests handed to the dispatcher
    pub requests_sent: u64,

    /// Requests whose batch was delivered
    pub requests_succeeded: u64,

    /// Requests completed with an error
    pub requests_failed: u64,

    /// Whether producers were stopped by a shutdown signal
    pub interrupted: bool,

    /// Total duration of the pipeline run, shutdown included
    pub duration: Duration,

    /// Time spent in dispatcher shutdown
    pub shutdown_duration: Duration,

    /// Live shards at shutdown
    pub shards: usize,

    /// Shards discarded after losing a creation race
    pub races_lost: u64,

    /// Highest number of concurrent downstream sends
    pub peak_in_flight: usize,

    /// Per-shard counters, keyed by partition label
    pub per_shard: Vec<(String, MetricsSnapshot)>,

    /// Downstream send summary
    pub flush: FlushSummary,
}

impl PipelineStats {
    /// Requests completed per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            (self.requests_succeeded + self.requests_failed) as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Sum of all shard counters
    pub fn totals(&self) -> MetricsSnapshot {
        self.per_shard
            .iter()
            .fold(MetricsSnapshot::default(), |acc, (_, m)| acc + *m)
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   |- Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   |- Shutdown: {:.2}ms", self.shutdown_duration.as_secs_f64() * 1000.0);
        println!("   |- Requests sent: {}", self.requests_sent);
        println!("   |- Succeeded: {}", self.requests_succeeded);
        println!("   |- Failed: {}", self.requests_failed);
        println!("   |- Throughput: {:.2} req/s", self.throughput());
        println!("   `- Interrupted: {}", self.interrupted);

        let totals = self.totals();
        println!("\nShards");
        println!("   |- Live shards: {}", self.shards);
        println!("   |- Creation races lost: {}", self.races_lost);
        println!("   |- Batches flushed: {}", totals.batches_flushed);
        println!("   |- Rejected requests: {}", totals.rejected_count);
        println!("   `- Peak concurrent sends: {}", self.peak_in_flight);

        if !self.per_shard.is_empty() {
            let mut per_shard = self.per_shard.clone();
            per_shard.sort_by(|a, b| a.0.cmp(&b.0));
            println!("\nPer shard");
            for (partition, m) in &per_shard {
                println!(
                    "   |- {}: enqueued={} batches={} size={} failures={}",
                    partition, m.enqueued_count, m.batches_flushed, m.size_flushed, m.send_failures
                );
            }
        }

        println!("\n{}", self.flush);
    }
}
