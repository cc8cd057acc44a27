//! Pipeline orchestrator - drives a dispatcher with synthetic load.
//!
//! Producers share one request counter and tag every request with a tenant
//! in the call-context metadata, so a configuration partitioned by
//! `tenant` fans the load out across one shard per tenant.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{BatcherConfig, CallContext, Done, MetadataKey, RecordBatch};
use dispatcher::{Dispatcher, DispatcherBuilder};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::sender::LatencySender;
use super::PipelineStats;

/// Metadata key carrying the synthetic tenant of a request
pub const TENANT_KEY: &str = "tenant";

/// Shape of the synthetic load
#[derive(Debug, Clone)]
pub struct LoadProfile {
    /// Distinct tenants requests are spread across
    pub tenants: usize,

    /// Total requests to submit
    pub requests: u64,

    /// Records per request
    pub records_per_request: usize,

    /// Payload bytes per record
    pub record_bytes: usize,

    /// Concurrent producers
    pub producers: usize,
}

impl LoadProfile {
    /// Call context of request `seq`
    fn context(&self, seq: u64) -> CallContext {
        let tenant = seq % self.tenants.max(1) as u64;
        CallContext::new().with_metadata(TENANT_KEY, format!("tenant-{tenant}"))
    }

    /// Payload of request `seq`
    fn request(&self, seq: u64) -> RecordBatch {
        let fill = (seq % 256) as u8;
        RecordBatch::new(
            (0..self.records_per_request)
                .map(|_| vec![fill; self.record_bytes].into())
                .collect(),
        )
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dispatcher configuration
    pub config: BatcherConfig,

    /// Synthetic load
    pub load: LoadProfile,

    /// Simulated downstream latency per batch
    pub send_latency: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

type LoadDispatcher = Dispatcher<LatencySender, MetadataKey>;

/// Outcome counts of one producer
#[derive(Debug, Default, Clone, Copy)]
struct ProducerReport {
    sent: u64,
    succeeded: u64,
    failed: u64,
}

impl std::ops::AddAssign for ProducerReport {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the load to completion, or until `shutdown` resolves.
    ///
    /// The dispatcher is shut down in both cases, so every request accepted
    /// before the signal is still flushed.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let PipelineConfig {
            config,
            load,
            send_latency,
            metrics_port,
        } = self.config;

        // Initialize Metrics (optional)
        if let Some(port) = metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let sender = Arc::new(LatencySender::new("synthetic", send_latency));
        let dispatcher: Arc<LoadDispatcher> = Arc::new(
            DispatcherBuilder::new(config, Arc::clone(&sender))
                .config_partitioner()
                .build(),
        );
        dispatcher.start().context("Failed to start dispatcher")?;

        info!(
            producers = load.producers,
            tenants = load.tenants,
            requests = load.requests,
            partitioned = dispatcher.is_partitioned(),
            "Producing synthetic load"
        );

        let next = Arc::new(AtomicU64::new(0));
        let mut producers = JoinSet::new();
        for _ in 0..load.producers {
            producers.spawn(produce(
                Arc::clone(&dispatcher),
                load.clone(),
                Arc::clone(&next),
            ));
        }

        let mut report = ProducerReport::default();
        let mut interrupted = false;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = producers.join_next() => match joined {
                    Some(Ok(r)) => report += r,
                    Some(Err(e)) if e.is_cancelled() => debug!("Producer cancelled"),
                    Some(Err(e)) => warn!(error = %e, "Producer task failed"),
                    None => break,
                },
                _ = &mut shutdown, if !interrupted => {
                    warn!("Received shutdown signal, stopping producers...");
                    interrupted = true;
                    producers.abort_all();
                }
            }
        }

        let shutdown_started = Instant::now();
        dispatcher
            .shutdown()
            .await
            .context("Dispatcher shutdown failed")?;
        let shutdown_duration = shutdown_started.elapsed();

        let flush = sender.stats().lock().summary();
        Ok(PipelineStats {
            requests_sent: report.sent,
            requests_succeeded: report.succeeded,
            requests_failed: report.failed,
            interrupted,
            duration: start_time.elapsed(),
            shutdown_duration,
            shards: dispatcher.shard_count(),
            races_lost: dispatcher.races_lost(),
            peak_in_flight: sender.peak_in_flight(),
            per_shard: dispatcher.metrics(),
            flush,
        })
    }
}

/// Submit requests until the shared counter is exhausted, then await outcomes
async fn produce(
    dispatcher: Arc<LoadDispatcher>,
    load: LoadProfile,
    next: Arc<AtomicU64>,
) -> ProducerReport {
    let mut report = ProducerReport::default();
    let mut pending = Vec::new();

    loop {
        let seq = next.fetch_add(1, Ordering::Relaxed);
        if seq >= load.requests {
            break;
        }
        let (done, outcome) = Done::channel();
        dispatcher
            .consume(load.context(seq), load.request(seq), done)
            .await;
        report.sent += 1;
        pending.push(outcome);
    }

    for outcome in pending {
        match outcome.await {
            Ok(Ok(())) => report.succeeded += 1,
            Ok(Err(e)) => {
                debug!(error = %e, "Request failed");
                report.failed += 1;
            }
            Err(_) => report.failed += 1,
        }
    }
    report
}
