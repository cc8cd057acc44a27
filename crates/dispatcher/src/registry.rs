//! ShardRegistry - partition key to shard mapping with race-safe lazy creation
//!
//! Lookups go through a sharded-lock map, so unrelated partitions never
//! contend on one global lock. Creation is check, build, then insert-if-absent:
//! concurrent creators of the same key may each build a shard, but only the
//! one that wins the insert is ever published. Losers are shut down before
//! they are dropped and never see a request.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::BatchSender;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::shard::ShardBatcher;

/// Concurrent map from partition key to shard
pub struct ShardRegistry<K, S: BatchSender> {
    shards: DashMap<K, Arc<ShardBatcher<S>>>,
    created: AtomicU64,
    races_lost: AtomicU64,
}

impl<K, S> ShardRegistry<K, S>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    S: BatchSender + Sync + 'static,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            created: AtomicU64::new(0),
            races_lost: AtomicU64::new(0),
        }
    }

    /// Look up the shard published under `key`
    pub fn get(&self, key: &K) -> Option<Arc<ShardBatcher<S>>> {
        self.shards.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the shard for `key`, creating and starting one on first use.
    ///
    /// `make` may run on several callers for the same new key; exactly one of
    /// the built shards is published and returned to all of them.
    pub async fn get_or_create<F>(&self, key: K, make: F) -> Arc<ShardBatcher<S>>
    where
        F: FnOnce(&K) -> Arc<ShardBatcher<S>>,
    {
        if let Some(shard) = self.get(&key) {
            return shard;
        }

        let candidate = make(&key);
        candidate.start();
        self.created.fetch_add(1, Ordering::Relaxed);

        let (canonical, published) = self.publish(key, Arc::clone(&candidate));
        if published {
            debug!(partition = %canonical.partition(), "Shard created");
            observability::record_shard_created(self.shards.len());
        } else {
            self.races_lost.fetch_add(1, Ordering::Relaxed);
            observability::record_shard_race_lost();
            debug!(partition = %candidate.partition(), "Lost shard creation race, discarding");
            if let Err(e) = candidate.shutdown().await {
                warn!(partition = %candidate.partition(), error = %e, "Discarded shard failed to stop");
            }
        }
        canonical
    }

    /// Insert `shard` under `key` unless a shard is already there.
    ///
    /// Returns the canonical shard and whether `shard` became it.
    pub fn publish(&self, key: K, shard: Arc<ShardBatcher<S>>) -> (Arc<ShardBatcher<S>>, bool) {
        match self.shards.entry(key) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&shard));
                (shard, true)
            }
        }
    }

    /// Snapshot of every published shard with its key
    pub fn shards(&self) -> Vec<(K, Arc<ShardBatcher<S>>)> {
        self.shards
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Number of published shards
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Whether no shard was published yet
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shards built so far, including discarded race losers
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Shards discarded after losing a creation race
    pub fn races_lost(&self) -> u64 {
        self.races_lost.load(Ordering::Relaxed)
    }
}

impl<K, S> Default for ShardRegistry<K, S>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    S: BatchSender + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::{ShardSettings, ShardState};
    use crate::worker_pool::WorkerPool;
    use contracts::{BatchConfig, CallContext, ContractError, Done, RecordBatch, SizerType};
    use std::sync::atomic::AtomicUsize;

    struct NullSender {
        sends: AtomicUsize,
    }

    impl BatchSender for NullSender {
        type Request = RecordBatch;

        fn name(&self) -> &str {
            "null"
        }

        async fn send(&self, _ctx: &CallContext, _batch: RecordBatch) -> Result<(), ContractError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings(sender: Arc<NullSender>) -> ShardSettings<NullSender> {
        ShardSettings {
            batch: BatchConfig {
                min_size: 1,
                ..BatchConfig::default()
            },
            queue_capacity: 8,
            sizer: SizerType::Items.sizer(),
            worker_pool: WorkerPool::unbounded(),
            sender,
        }
    }

    fn null_sender() -> Arc<NullSender> {
        Arc::new(NullSender {
            sends: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_shard() {
        let sender = null_sender();
        let registry: ShardRegistry<String, NullSender> = ShardRegistry::new();

        let first = registry
            .get_or_create("a".to_string(), |k| {
                Arc::new(ShardBatcher::new(k.clone(), settings(Arc::clone(&sender))))
            })
            .await;
        let second = registry
            .get_or_create("a".to_string(), |_| unreachable!("shard already exists"))
            .await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), ShardState::Running);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.created_count(), 1);
    }

    #[tokio::test]
    async fn test_losing_candidate_is_shut_down() {
        let sender = null_sender();
        let registry: ShardRegistry<String, NullSender> = ShardRegistry::new();
        let winner = Arc::new(ShardBatcher::new("x", settings(Arc::clone(&sender))));
        winner.start();

        let mut loser = None;
        let resolved = registry
            .get_or_create("x".to_string(), |k| {
                // A concurrent creator publishes between the lookup and our insert.
                let (_, published) = registry.publish(k.clone(), Arc::clone(&winner));
                assert!(published);
                let candidate = Arc::new(ShardBatcher::new(k.clone(), settings(Arc::clone(&sender))));
                loser = Some(Arc::clone(&candidate));
                candidate
            })
            .await;

        let loser = loser.unwrap();
        assert!(Arc::ptr_eq(&resolved, &winner));
        assert!(!Arc::ptr_eq(&resolved, &loser));
        assert_eq!(loser.state(), ShardState::Stopped);
        assert_eq!(loser.metrics().enqueued_count(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.races_lost(), 1);

        resolved
            .consume(CallContext::new(), RecordBatch::single("v"), Done::noop())
            .await;
        resolved.shutdown().await.unwrap();
        assert_eq!(sender.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creators_publish_one_shard() {
        let sender = null_sender();
        let registry: Arc<ShardRegistry<String, NullSender>> = Arc::new(ShardRegistry::new());

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let sender = Arc::clone(&sender);
            tasks.push(tokio::spawn(async move {
                registry
                    .get_or_create("hot".to_string(), |k| {
                        Arc::new(ShardBatcher::new(k.clone(), settings(sender)))
                    })
                    .await
            }));
        }

        let mut resolved = Vec::new();
        for task in tasks {
            resolved.push(task.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        let canonical = registry.get(&"hot".to_string()).unwrap();
        assert!(resolved.iter().all(|s| Arc::ptr_eq(s, &canonical)));
        assert_eq!(registry.created_count(), registry.races_lost() + 1);
    }
}
