//! ShardBatcher - one partition's batch accumulator and flush path
//!
//! Each shard owns a bounded request queue drained by a worker task. The worker
//! folds requests into a pending batch and flushes it when the batch reaches
//! `min_size`, would exceed `max_size`, outlives `flush_timeout`, or the shard
//! shuts down. A flush first takes a permit from the shared worker pool, then
//! sends the batch on a separate task and completes every request's `Done`
//! with the send outcome.

use std::fmt;
use std::sync::Arc;

use contracts::{
    BatchConfig, BatchSender, CallContext, ContractError, Done, DoneResult, Request, Sizer,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::ShardMetrics;
use crate::worker_pool::{WorkerPermit, WorkerPool};

/// Everything a shard is built from, shared by all shards of a dispatcher.
pub struct ShardSettings<S: BatchSender> {
    /// Flush policy
    pub batch: BatchConfig,
    /// Request queue capacity
    pub queue_capacity: usize,
    /// Request sizer
    pub sizer: Arc<dyn Sizer<S::Request>>,
    /// Shared worker pool
    pub worker_pool: WorkerPool,
    /// Downstream sender
    pub sender: Arc<S>,
}

impl<S: BatchSender> Clone for ShardSettings<S> {
    fn clone(&self) -> Self {
        Self {
            batch: self.batch.clone(),
            queue_capacity: self.queue_capacity,
            sizer: Arc::clone(&self.sizer),
            worker_pool: self.worker_pool.clone(),
            sender: Arc::clone(&self.sender),
        }
    }
}

/// Observable lifecycle of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Constructed, worker not spawned yet
    Created,
    /// Worker accepting and flushing requests
    Running,
    /// Draining queue and in-flight sends
    ShuttingDown,
    /// Terminal
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    MinSize,
    MaxSize,
    Timeout,
    Shutdown,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::MinSize => "min_size",
            Self::MaxSize => "max_size",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

enum ShardMessage<R> {
    Submit {
        ctx: CallContext,
        request: R,
        done: Done,
    },
    Shutdown,
}

enum Lifecycle<R> {
    Created(mpsc::Receiver<ShardMessage<R>>),
    Running(JoinHandle<()>),
    ShuttingDown,
    Stopped,
}

/// State shared between the shard handle, its worker and its send tasks
struct ShardCore<S: BatchSender> {
    partition: String,
    settings: ShardSettings<S>,
    metrics: Arc<ShardMetrics>,
}

/// A single partition's batcher
pub struct ShardBatcher<S: BatchSender> {
    core: Arc<ShardCore<S>>,
    tx: mpsc::Sender<ShardMessage<S::Request>>,
    lifecycle: Mutex<Lifecycle<S::Request>>,
    /// Set once the lifecycle reaches `Stopped`
    stopped: watch::Sender<bool>,
}

impl<S> ShardBatcher<S>
where
    S: BatchSender + Sync + 'static,
{
    /// Create a shard for `partition`; the worker is spawned by [`start`](Self::start)
    pub fn new(partition: impl Into<String>, settings: ShardSettings<S>) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            core: Arc::new(ShardCore {
                partition: partition.into(),
                settings,
                metrics: Arc::new(ShardMetrics::new()),
            }),
            tx,
            lifecycle: Mutex::new(Lifecycle::Created(rx)),
            stopped: watch::Sender::new(false),
        }
    }

    /// Partition label
    pub fn partition(&self) -> &str {
        &self.core.partition
    }

    /// Current metrics
    pub fn metrics(&self) -> &Arc<ShardMetrics> {
        &self.core.metrics
    }

    /// Current lifecycle state
    pub fn state(&self) -> ShardState {
        match &*self.lifecycle.lock() {
            Lifecycle::Created(_) => ShardState::Created,
            Lifecycle::Running(_) => ShardState::Running,
            Lifecycle::ShuttingDown => ShardState::ShuttingDown,
            Lifecycle::Stopped => ShardState::Stopped,
        }
    }

    /// Spawn the worker task. No-op unless the shard is freshly created.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        *lifecycle = match previous {
            Lifecycle::Created(rx) => {
                let worker = ShardWorker::new(Arc::clone(&self.core));
                debug!(partition = %self.core.partition, "Shard started");
                Lifecycle::Running(tokio::spawn(worker.run(rx)))
            }
            other => other,
        };
    }

    /// Enqueue a request; waits while the queue is full.
    ///
    /// If the shard no longer accepts requests, `done` completes with
    /// [`ContractError::ShardClosed`].
    pub async fn consume(&self, ctx: CallContext, request: S::Request, done: Done) {
        let message = ShardMessage::Submit { ctx, request, done };
        match self.tx.send(message).await {
            Ok(()) => self.core.metrics.inc_enqueued_count(),
            Err(mpsc::error::SendError(ShardMessage::Submit { done, .. })) => {
                self.core.reject(done);
            }
            Err(mpsc::error::SendError(ShardMessage::Shutdown)) => {}
        }
    }

    /// Flush everything pending, wait for in-flight sends and stop the worker.
    ///
    /// Only the first call performs the shutdown. Concurrent calls wait for it
    /// to finish and later calls return at once, both with `Ok(())`.
    #[instrument(name = "shard_shutdown", skip(self), fields(partition = %self.core.partition))]
    pub async fn shutdown(&self) -> Result<(), DispatcherError> {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            let previous = std::mem::replace(&mut *lifecycle, Lifecycle::ShuttingDown);
            match previous {
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Created(rx) => {
                    *lifecycle = Lifecycle::Stopped;
                    drop(lifecycle);
                    self.core.reject_queued(rx);
                    self.stopped.send_replace(true);
                    debug!("Shard stopped before start");
                    return Ok(());
                }
                Lifecycle::ShuttingDown => None,
                Lifecycle::Stopped => {
                    *lifecycle = Lifecycle::Stopped;
                    return Ok(());
                }
            }
        };

        let Some(handle) = handle else {
            let mut stopped = self.stopped.subscribe();
            let _ = stopped.wait_for(|stopped| *stopped).await;
            return Ok(());
        };

        // Fails only if the worker already exited; the join below reports why.
        let _ = self.tx.send(ShardMessage::Shutdown).await;
        let outcome = handle.await;
        *self.lifecycle.lock() = Lifecycle::Stopped;
        self.stopped.send_replace(true);

        match outcome {
            Ok(()) => {
                debug!("Shard shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Shard worker task failed");
                Err(DispatcherError::shard_task(
                    &self.core.partition,
                    e.to_string(),
                ))
            }
        }
    }
}

impl<S: BatchSender> fmt::Debug for ShardBatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardBatcher")
            .field("partition", &self.core.partition)
            .finish_non_exhaustive()
    }
}

impl<S> ShardCore<S>
where
    S: BatchSender + Sync + 'static,
{
    fn reject(&self, done: Done) {
        self.metrics.add_rejected_count(1);
        done.complete(Err(Arc::new(ContractError::shard_closed(&self.partition))));
    }

    fn reject_queued(&self, mut rx: mpsc::Receiver<ShardMessage<S::Request>>) {
        rx.close();
        while let Ok(message) = rx.try_recv() {
            if let ShardMessage::Submit { done, .. } = message {
                self.reject(done);
            }
        }
    }

    fn abort_batch(&self, batch: PendingBatch<S::Request>, message: String) {
        self.metrics.add_rejected_count(batch.dones.len() as u64);
        let error = Arc::new(ContractError::flush_aborted(&self.partition, message));
        for done in batch.dones {
            done.complete(Err(Arc::clone(&error)));
        }
    }

    async fn send_batch(
        &self,
        batch: PendingBatch<S::Request>,
        reason: FlushReason,
        permit: WorkerPermit,
    ) {
        let PendingBatch {
            ctx,
            request,
            size,
            dones,
            ..
        } = batch;
        let requests = dones.len();

        let started = Instant::now();
        let result = self.settings.sender.send(&ctx, request).await;
        drop(permit);

        self.metrics.record_flush(size);
        observability::record_batch_flushed(reason.as_str(), size, result.is_ok());
        observability::record_send_latency_ms(started.elapsed().as_secs_f64() * 1000.0);

        let outcome: DoneResult = match result {
            Ok(()) => {
                debug!(
                    partition = %self.partition,
                    reason = reason.as_str(),
                    size,
                    requests,
                    "Batch sent"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_send_failures();
                warn!(
                    partition = %self.partition,
                    sender = self.settings.sender.name(),
                    reason = reason.as_str(),
                    size,
                    requests,
                    error = %e,
                    "Batch send failed"
                );
                Err(Arc::new(e))
            }
        };

        for done in dones {
            done.complete(outcome.clone());
        }
    }
}

/// Requests merged so far, with their completion callbacks
struct PendingBatch<R> {
    ctx: CallContext,
    request: R,
    size: usize,
    dones: Vec<Done>,
    deadline: Instant,
}

/// Worker task state
struct ShardWorker<S: BatchSender> {
    core: Arc<ShardCore<S>>,
    pending: Option<PendingBatch<S::Request>>,
    in_flight: JoinSet<()>,
}

impl<S> ShardWorker<S>
where
    S: BatchSender + Sync + 'static,
{
    fn new(core: Arc<ShardCore<S>>) -> Self {
        Self {
            core,
            pending: None,
            in_flight: JoinSet::new(),
        }
    }

    #[instrument(name = "shard_worker_loop", skip_all, fields(partition = %self.core.partition))]
    async fn run(mut self, mut rx: mpsc::Receiver<ShardMessage<S::Request>>) {
        debug!("Shard worker started");

        loop {
            let deadline = self.pending.as_ref().map(|batch| batch.deadline);
            tokio::select! {
                message = rx.recv() => match message {
                    Some(ShardMessage::Submit { ctx, request, done }) => {
                        self.accept(ctx, request, done).await;
                    }
                    Some(ShardMessage::Shutdown) | None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush(FlushReason::Timeout).await;
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.report_join(joined);
                }
            }
        }

        // Requests that raced with the shutdown signal still get batched.
        rx.close();
        while let Some(message) = rx.recv().await {
            if let ShardMessage::Submit { ctx, request, done } = message {
                self.accept(ctx, request, done).await;
            }
        }
        self.flush(FlushReason::Shutdown).await;

        while let Some(joined) = self.in_flight.join_next().await {
            self.report_join(joined);
        }

        debug!("Shard worker stopped");
    }

    async fn accept(&mut self, ctx: CallContext, request: S::Request, done: Done) {
        let batch_config = &self.core.settings.batch;
        let (min_size, max_size) = (batch_config.min_size, batch_config.max_size);
        let size = self.core.settings.sizer.size(&request);

        if max_size > 0
            && self
                .pending
                .as_ref()
                .is_some_and(|batch| batch.size + size > max_size)
        {
            self.flush(FlushReason::MaxSize).await;
        }

        match &mut self.pending {
            Some(batch) => {
                batch.request.merge(request);
                batch.size += size;
                batch.dones.push(done);
            }
            None => {
                self.pending = Some(PendingBatch {
                    ctx,
                    request,
                    size,
                    dones: vec![done],
                    deadline: Instant::now() + self.core.settings.batch.flush_timeout(),
                });
            }
        }

        if self
            .pending
            .as_ref()
            .is_some_and(|batch| batch.size >= min_size)
        {
            self.flush(FlushReason::MinSize).await;
        }
    }

    /// Hand the pending batch to a send task once a worker permit is available
    async fn flush(&mut self, reason: FlushReason) {
        let Some(batch) = self.pending.take() else {
            return;
        };

        let waiting = Instant::now();
        let permit = match self.core.settings.worker_pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "No worker permit, aborting batch");
                self.core.abort_batch(batch, e.to_string());
                return;
            }
        };
        observability::record_worker_permit_wait_ms(waiting.elapsed().as_secs_f64() * 1000.0);

        let core = Arc::clone(&self.core);
        self.in_flight
            .spawn(async move { core.send_batch(batch, reason, permit).await });
    }

    fn report_join(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "Send task failed");
        }
    }
}
