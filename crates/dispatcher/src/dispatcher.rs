//! Dispatcher - routes requests to per-partition shards

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use contracts::{
    BatchSender, BatcherConfig, CallContext, Done, MetadataKey, MetadataPartitioner, Partitioner,
    Sizer,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::MetricsSnapshot;
use crate::registry::ShardRegistry;
use crate::shard::{ShardBatcher, ShardSettings};
use crate::worker_pool::WorkerPool;

/// Partition identity of a shard.
///
/// `Unpartitioned` is reserved for the single shard of a dispatcher without a
/// partitioner and never equals a key a partitioner produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey<K> {
    Unpartitioned,
    Key(K),
}

impl<K> PartitionKey<K> {
    /// Label of the single shard of an unpartitioned dispatcher
    pub const UNPARTITIONED_LABEL: &'static str = "<unpartitioned>";
}

impl<K: fmt::Display> fmt::Display for PartitionKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Unpartitioned => f.write_str(Self::UNPARTITIONED_LABEL),
            PartitionKey::Key(key) => fmt::Display::fmt(key, f),
        }
    }
}

/// Renders a partition key as a shard label
type KeyLabel<K> = fn(&K) -> String;

fn display_label<K: fmt::Display>(key: &K) -> String {
    PartitionKey::Key(key).to_string()
}

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    Active = 0,
    Draining = 1,
    Stopped = 2,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

type DynPartitioner<R, K> = Arc<dyn Partitioner<R, Key = K>>;

enum Routing<S: BatchSender, K> {
    Single(Arc<ShardBatcher<S>>),
    Partitioned {
        partitioner: DynPartitioner<S::Request, K>,
        label: KeyLabel<K>,
        registry: ShardRegistry<K, S>,
    },
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<S: BatchSender, K = ()> {
    config: BatcherConfig,
    sender: Arc<S>,
    sizer: Option<Arc<dyn Sizer<S::Request>>>,
    partitioner: Option<(DynPartitioner<S::Request, K>, KeyLabel<K>)>,
}

impl<S> DispatcherBuilder<S, ()>
where
    S: BatchSender + Sync + 'static,
{
    /// Create a builder; without a partitioner the dispatcher runs one shard
    pub fn new(config: BatcherConfig, sender: Arc<S>) -> Self {
        Self {
            config,
            sender,
            sizer: None,
            partitioner: None,
        }
    }

    /// Route requests by `partitioner`; shards are labelled by the key's `Display`
    pub fn partitioner<P>(self, partitioner: P) -> DispatcherBuilder<S, P::Key>
    where
        P: Partitioner<S::Request> + 'static,
        P::Key: fmt::Display,
    {
        let partitioner: DynPartitioner<S::Request, P::Key> = Arc::new(partitioner);
        let label: KeyLabel<P::Key> = display_label::<P::Key>;
        DispatcherBuilder {
            config: self.config,
            sender: self.sender,
            sizer: self.sizer,
            partitioner: Some((partitioner, label)),
        }
    }

    /// Route requests by the metadata keys of the configured partition section
    ///
    /// Keeps a single shard when the configuration has no partition section.
    pub fn config_partitioner(self) -> DispatcherBuilder<S, MetadataKey> {
        let partitioner = self.config.partition.as_ref().map(|p| {
            let partitioner: DynPartitioner<S::Request, MetadataKey> =
                Arc::new(MetadataPartitioner::new(p.metadata_keys.iter().cloned()));
            (partitioner, display_label::<MetadataKey> as KeyLabel<MetadataKey>)
        });
        DispatcherBuilder {
            config: self.config,
            sender: self.sender,
            sizer: self.sizer,
            partitioner,
        }
    }
}

impl<S, K> DispatcherBuilder<S, K>
where
    S: BatchSender + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Override the sizer derived from `batch.sizer`
    pub fn sizer(mut self, sizer: Arc<dyn Sizer<S::Request>>) -> Self {
        self.sizer = Some(sizer);
        self
    }

    /// Build the dispatcher
    ///
    /// In unpartitioned mode the single shard is created here and started by
    /// [`Dispatcher::start`].
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(
            max_workers = self.config.max_workers,
            partitioned = self.partitioner.is_some()
        )
    )]
    pub fn build(self) -> Dispatcher<S, K> {
        let sizer = self
            .sizer
            .unwrap_or_else(|| self.config.batch.sizer.sizer());
        let settings = ShardSettings {
            batch: self.config.batch.clone(),
            queue_capacity: self.config.queue_capacity,
            sizer,
            worker_pool: WorkerPool::new(self.config.max_workers),
            sender: self.sender,
        };

        let routing = match self.partitioner {
            Some((partitioner, label)) => Routing::Partitioned {
                partitioner,
                label,
                registry: ShardRegistry::new(),
            },
            None => Routing::Single(Arc::new(ShardBatcher::new(
                PartitionKey::<K>::UNPARTITIONED_LABEL,
                settings.clone(),
            ))),
        };

        Dispatcher {
            settings,
            routing,
            state: AtomicU8::new(DispatcherState::Active as u8),
            drained: watch::Sender::new(false),
        }
    }
}

/// Routes each request to the shard of its partition and owns shard teardown
pub struct Dispatcher<S: BatchSender, K = ()> {
    settings: ShardSettings<S>,
    routing: Routing<S, K>,
    state: AtomicU8,
    /// Set once the shutdown that claimed the drain has finished
    drained: watch::Sender<bool>,
}

impl<S, K> Dispatcher<S, K>
where
    S: BatchSender + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Start the dispatcher.
    ///
    /// Starts the single shard in unpartitioned mode; partitioned shards start
    /// when they are created. Never fails.
    pub fn start(&self) -> Result<(), DispatcherError> {
        if let Routing::Single(shard) = &self.routing {
            shard.start();
        }
        info!(
            partitioned = self.is_partitioned(),
            max_workers = ?self.settings.worker_pool.capacity(),
            "Dispatcher started"
        );
        Ok(())
    }

    /// Forward a request to its shard.
    ///
    /// The outcome is reported only through `done`.
    pub async fn consume(&self, ctx: CallContext, request: S::Request, done: Done) {
        let shard = self.resolve(&ctx, &request).await;
        shard.consume(ctx, request, done).await;
    }

    /// Shard a request routes to, creating it on first use of its key
    pub async fn resolve(&self, ctx: &CallContext, request: &S::Request) -> Arc<ShardBatcher<S>> {
        match &self.routing {
            Routing::Single(shard) => Arc::clone(shard),
            Routing::Partitioned {
                partitioner,
                label,
                registry,
            } => {
                let key = partitioner.key(ctx, request);
                registry
                    .get_or_create(key, |key| {
                        Arc::new(ShardBatcher::new(label(key), self.settings.clone()))
                    })
                    .await
            }
        }
    }

    /// Stop every shard.
    ///
    /// Unpartitioned: returns the single shard's outcome. Partitioned: shuts
    /// all shards down concurrently, waits for the slowest and reports success;
    /// individual shard failures are logged and dropped.
    ///
    /// The first call drains. Overlapping and later calls wait until that
    /// drain has finished and return `Ok(())`.
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(&self) -> Result<(), DispatcherError> {
        let claimed = self
            .state
            .compare_exchange(
                DispatcherState::Active as u8,
                DispatcherState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !claimed {
            let mut drained = self.drained.subscribe();
            // The sender lives in `self`, so this only returns once drained.
            let _ = drained.wait_for(|drained| *drained).await;
            return Ok(());
        }

        let result = match &self.routing {
            Routing::Single(shard) => shard.shutdown().await,
            Routing::Partitioned { registry, .. } => {
                Self::shutdown_shards(registry).await;
                Ok(())
            }
        };

        self.set_state(DispatcherState::Stopped);
        self.drained.send_replace(true);
        info!("Dispatcher shutdown complete");
        result
    }

    async fn shutdown_shards(registry: &ShardRegistry<K, S>) {
        let shards = registry.shards();
        let mut active = shards.len();
        debug!(shards = active, "Shutting down shards");

        let mut tasks = JoinSet::new();
        for (_, shard) in shards {
            tasks.spawn(async move {
                let outcome = shard.shutdown().await;
                (shard, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            active -= 1;
            observability::record_shards_active(active);
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((shard, Err(e))) => {
                    warn!(partition = %shard.partition(), error = %e, "Shard shutdown failed");
                }
                Err(e) => {
                    error!(error = %e, "Shard shutdown task failed");
                }
            }
        }
    }

    /// Whether a partitioner is configured
    pub fn is_partitioned(&self) -> bool {
        matches!(self.routing, Routing::Partitioned { .. })
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Number of live shards
    pub fn shard_count(&self) -> usize {
        match &self.routing {
            Routing::Single(_) => 1,
            Routing::Partitioned { registry, .. } => registry.len(),
        }
    }

    /// Shard published for `key`, if any (partitioned mode only)
    pub fn shard(&self, key: &K) -> Option<Arc<ShardBatcher<S>>> {
        match &self.routing {
            Routing::Single(_) => None,
            Routing::Partitioned { registry, .. } => registry.get(key),
        }
    }

    /// Shards built and discarded after losing a creation race
    pub fn races_lost(&self) -> u64 {
        match &self.routing {
            Routing::Single(_) => 0,
            Routing::Partitioned { registry, .. } => registry.races_lost(),
        }
    }

    /// Metrics for all shards, keyed by partition label
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        match &self.routing {
            Routing::Single(shard) => {
                vec![(shard.partition().to_string(), shard.metrics().snapshot())]
            }
            Routing::Partitioned { registry, .. } => registry
                .shards()
                .into_iter()
                .map(|(_, shard)| (shard.partition().to_string(), shard.metrics().snapshot()))
                .collect(),
        }
    }

    /// Sum of all shard metrics
    pub fn total_metrics(&self) -> MetricsSnapshot {
        self.metrics()
            .into_iter()
            .fold(MetricsSnapshot::default(), |acc, (_, m)| acc + m)
    }
}
