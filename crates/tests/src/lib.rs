//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 分发器端到端场景（并发上限、分区、创建竞争、并行关闭）

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use contracts::{BatchSender, CallContext, ContractError, RecordBatch, Request};
    use observability::FlushStatsAggregator;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    pub const TENANT: &str = "tenant";

    /// One downstream send as observed by [`RecordingSender`]
    #[derive(Debug, Clone)]
    pub struct SendRecord {
        pub tenant: Option<String>,
        pub records: Vec<Vec<u8>>,
        pub started: Instant,
        pub finished: Instant,
    }

    /// Sender that sleeps per tenant and records every batch it receives
    #[derive(Default)]
    pub struct RecordingSender {
        default_delay: Duration,
        delays: HashMap<String, Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        sends: Mutex<Vec<SendRecord>>,
        stats: Mutex<FlushStatsAggregator>,
    }

    impl RecordingSender {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                default_delay: delay,
                ..Self::default()
            }
        }

        pub fn tenant_delay(mut self, tenant: &str, delay: Duration) -> Self {
            self.delays.insert(tenant.to_string(), delay);
            self
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn sends(&self) -> Vec<SendRecord> {
            self.sends.lock().clone()
        }

        pub fn total_items(&self) -> u64 {
            self.stats.lock().summary().total_items
        }
    }

    impl BatchSender for RecordingSender {
        type Request = RecordBatch;

        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, ctx: &CallContext, batch: RecordBatch) -> Result<(), ContractError> {
            let started = Instant::now();
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

            let tenant = ctx.metadata(TENANT).map(str::to_string);
            let delay = tenant
                .as_ref()
                .and_then(|t| self.delays.get(t))
                .copied()
                .unwrap_or(self.default_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let finished = Instant::now();
            self.stats.lock().update(
                batch.items_count(),
                (finished - started).as_secs_f64() * 1000.0,
                true,
            );
            self.sends.lock().push(SendRecord {
                tenant,
                records: batch.records.iter().map(|r| r.to_vec()).collect(),
                started,
                finished,
            });
            Ok(())
        }
    }

    pub fn tenant_ctx(tenant: &str) -> CallContext {
        CallContext::new().with_metadata(TENANT, tenant)
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        BatcherConfig, ContractError, Done, MetadataKey, PartitionConfig, RecordBatch,
    };
    use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherState, ShardState};
    use tokio::task::JoinSet;
    use tokio::time::Instant;

    use crate::support::{tenant_ctx, RecordingSender, TENANT};

    fn tenant_config(min_size: usize, flush_timeout_ms: u64) -> BatcherConfig {
        let mut config = BatcherConfig::default();
        config.batch.min_size = min_size;
        config.batch.flush_timeout_ms = flush_timeout_ms;
        config.partition = Some(PartitionConfig {
            metadata_keys: vec![TENANT.to_string()],
        });
        config
    }

    fn tenant_key(tenant: &str) -> MetadataKey {
        MetadataKey::new(vec![Some(tenant.to_string())])
    }

    fn partitioned(
        config: BatcherConfig,
        sender: &Arc<RecordingSender>,
    ) -> Arc<Dispatcher<RecordingSender, MetadataKey>> {
        let dispatcher = DispatcherBuilder::new(config, Arc::clone(sender))
            .config_partitioner()
            .build();
        dispatcher.start().unwrap();
        Arc::new(dispatcher)
    }

    /// 并发上限：max_workers=2 时同时进行的下游发送不超过 2 个
    #[tokio::test]
    async fn test_worker_limit_bounds_concurrent_sends() {
        let sender = Arc::new(RecordingSender::with_delay(Duration::from_millis(50)));
        let mut config = BatcherConfig::default();
        config.max_workers = 2;
        config.batch.min_size = 1;

        let dispatcher: Dispatcher<RecordingSender> =
            DispatcherBuilder::new(config, Arc::clone(&sender)).build();
        dispatcher.start().unwrap();

        let mut outcomes = Vec::new();
        for i in 0..5u8 {
            let (done, outcome) = Done::channel();
            dispatcher
                .consume(tenant_ctx("any"), RecordBatch::single(vec![i]), done)
                .await;
            outcomes.push(outcome);
        }

        for outcome in outcomes {
            assert!(outcome.await.unwrap().is_ok());
        }

        assert_eq!(sender.peak_in_flight(), 2);
        assert_eq!(sender.sends().len(), 5);
        dispatcher.shutdown().await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    /// 跨分片并发上限：3 个租户并发生产，所有分片共享 max_workers=2 的 worker 池
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_limit_holds_across_shards() {
        let sender = Arc::new(RecordingSender::with_delay(Duration::from_millis(50)));
        let mut config = tenant_config(1, 10_000);
        config.max_workers = 2;
        let dispatcher = partitioned(config, &sender);

        let mut producers = JoinSet::new();
        for tenant in ["A", "B", "C"] {
            let dispatcher = Arc::clone(&dispatcher);
            producers.spawn(async move {
                let mut outcomes = Vec::new();
                for i in 0..3u8 {
                    let (done, outcome) = Done::channel();
                    dispatcher
                        .consume(tenant_ctx(tenant), RecordBatch::single(vec![i]), done)
                        .await;
                    outcomes.push(outcome);
                }
                for outcome in outcomes {
                    assert!(outcome.await.unwrap().is_ok());
                }
            });
        }
        while let Some(joined) = producers.join_next().await {
            joined.unwrap();
        }

        dispatcher.shutdown().await.unwrap();

        assert_eq!(dispatcher.shard_count(), 3);
        assert_eq!(sender.sends().len(), 9);
        assert_eq!(sender.peak_in_flight(), 2);
    }

    /// 分区：租户 A/B/A/B/C 产生 3 个分片，每个租户的数据只进入自己的分片
    #[tokio::test]
    async fn test_requests_partitioned_by_tenant() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = partitioned(tenant_config(100, 10_000), &sender);

        for (i, tenant) in ["A", "B", "A", "B", "C"].into_iter().enumerate() {
            dispatcher
                .consume(
                    tenant_ctx(tenant),
                    RecordBatch::single(vec![i as u8]),
                    Done::noop(),
                )
                .await;
        }

        assert_eq!(dispatcher.shard_count(), 3);
        let shard_a = dispatcher.shard(&tenant_key("A")).unwrap();
        assert_eq!(shard_a.metrics().enqueued_count(), 2);
        assert_eq!(
            dispatcher.shard(&tenant_key("C")).unwrap().metrics().enqueued_count(),
            1
        );
        assert!(dispatcher.shard(&tenant_key("D")).is_none());

        dispatcher.shutdown().await.unwrap();

        let mut sends = sender.sends();
        sends.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        let grouped: Vec<(Option<String>, Vec<Vec<u8>>)> = sends
            .into_iter()
            .map(|s| {
                let mut records = s.records;
                records.sort();
                (s.tenant, records)
            })
            .collect();
        assert_eq!(
            grouped,
            vec![
                (Some("A".to_string()), vec![vec![0], vec![2]]),
                (Some("B".to_string()), vec![vec![1], vec![3]]),
                (Some("C".to_string()), vec![vec![4]]),
            ]
        );
    }

    /// 创建竞争：同一新键的并发首次请求只发布一个分片，且无重复发送
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_one_shard() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = partitioned(tenant_config(1_000, 50), &sender);

        let mut tasks = JoinSet::new();
        for i in 0..16u8 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.spawn(async move {
                let (done, outcome) = Done::channel();
                dispatcher
                    .consume(tenant_ctx("X"), RecordBatch::single(vec![i]), done)
                    .await;
                outcome.await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().unwrap().is_ok());
        }

        assert_eq!(dispatcher.shard_count(), 1);
        let shard = dispatcher.shard(&tenant_key("X")).unwrap();
        assert_eq!(shard.metrics().enqueued_count(), 16);

        dispatcher.shutdown().await.unwrap();

        let mut delivered: Vec<Vec<u8>> = sender
            .sends()
            .into_iter()
            .flat_map(|s| s.records)
            .collect();
        delivered.sort();
        let expected: Vec<Vec<u8>> = (0..16u8).map(|i| vec![i]).collect();
        assert_eq!(delivered, expected);
        assert_eq!(sender.total_items(), 16);
    }

    /// 并行关闭：3 个分片同时 flush，关闭耗时取决于最慢分片而非总和
    #[tokio::test]
    async fn test_shutdown_runs_shards_concurrently() {
        let sender = Arc::new(
            RecordingSender::with_delay(Duration::from_millis(150))
                .tenant_delay("C", Duration::from_millis(300)),
        );
        let dispatcher = partitioned(tenant_config(1_000, 60_000), &sender);

        for tenant in ["A", "B", "C"] {
            dispatcher
                .consume(tenant_ctx(tenant), RecordBatch::single("x"), Done::noop())
                .await;
        }
        assert_eq!(dispatcher.shard_count(), 3);
        assert!(sender.sends().is_empty());

        let started = Instant::now();
        dispatcher.shutdown().await.unwrap();
        let elapsed = started.elapsed();

        let sends = sender.sends();
        assert_eq!(sends.len(), 3);

        // Blocks until the slowest shard finished
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        let slowest = sends.iter().map(|s| s.finished).max().unwrap();
        assert!(slowest <= started + elapsed);

        // Serial shutdown would take 150 + 150 + 300 ms
        assert!(elapsed < Duration::from_millis(550), "elapsed {elapsed:?}");
        let first_start = sends.iter().map(|s| s.started).min().unwrap();
        let last_start = sends.iter().map(|s| s.started).max().unwrap();
        assert!(
            last_start - first_start < Duration::from_millis(100),
            "send starts spread over {:?}",
            last_start - first_start
        );
    }

    /// 同一分区键始终解析到同一分片
    #[tokio::test]
    async fn test_partition_key_is_stable() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = partitioned(tenant_config(100, 10_000), &sender);
        let request = RecordBatch::single("x");

        let first = dispatcher.resolve(&tenant_ctx("A"), &request).await;
        let again = dispatcher.resolve(&tenant_ctx("A"), &request).await;
        let other = dispatcher.resolve(&tenant_ctx("B"), &request).await;
        let missing = dispatcher
            .resolve(&contracts::CallContext::new(), &request)
            .await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(first.partition(), "A");
        assert_eq!(missing.partition(), "-");
        assert_eq!(dispatcher.shard_count(), 3);

        dispatcher.shutdown().await.unwrap();
    }

    /// 关闭完整性：所有分片停止，关闭后到达的请求以 ShardClosed 完成
    #[tokio::test]
    async fn test_shutdown_stops_every_shard() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = partitioned(tenant_config(100, 10_000), &sender);

        let mut outcomes = Vec::new();
        for tenant in ["A", "B"] {
            let (done, outcome) = Done::channel();
            dispatcher
                .consume(tenant_ctx(tenant), RecordBatch::single("x"), done)
                .await;
            outcomes.push(outcome);
        }

        dispatcher.shutdown().await.unwrap();
        for outcome in outcomes {
            assert!(outcome.await.unwrap().is_ok());
        }

        let shard_a = dispatcher.shard(&tenant_key("A")).unwrap();
        let shard_b = dispatcher.shard(&tenant_key("B")).unwrap();
        assert_eq!(shard_a.state(), ShardState::Stopped);
        assert_eq!(shard_b.state(), ShardState::Stopped);

        let (done, outcome) = Done::channel();
        dispatcher
            .consume(tenant_ctx("A"), RecordBatch::single("late"), done)
            .await;
        let err = outcome.await.unwrap().unwrap_err();
        assert!(matches!(*err, ContractError::ShardClosed { .. }));

        // Second shutdown is a no-op
        dispatcher.shutdown().await.unwrap();
        assert_eq!(sender.sends().len(), 2);
    }

    /// 重叠关闭：第二次关闭等待第一次排空完成后才返回
    #[tokio::test]
    async fn test_overlapping_shutdown_waits_for_first() {
        let sender = Arc::new(RecordingSender::with_delay(Duration::from_millis(200)));
        let dispatcher = partitioned(tenant_config(100, 10_000), &sender);

        let (done, outcome) = Done::channel();
        dispatcher
            .consume(tenant_ctx("A"), RecordBatch::single("x"), done)
            .await;
        let shard = dispatcher.shard(&tenant_key("A")).unwrap();

        let first = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.shutdown().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        dispatcher.shutdown().await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(shard.state(), ShardState::Stopped);
        assert_eq!(sender.sends().len(), 1);
        assert!(outcome.await.unwrap().is_ok());

        first.await.unwrap().unwrap();
    }

    /// 配置驱动：从 TOML 加载配置并按配置分区
    #[tokio::test]
    async fn test_dispatcher_from_loaded_config() {
        let content = r#"
max_workers = 1
queue_capacity = 16

[batch]
flush_timeout_ms = 1000
min_size = 3

[partition]
metadata_keys = ["tenant"]
"#;
        let config = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let sender = Arc::new(RecordingSender::with_delay(Duration::from_millis(30)));
        let dispatcher = partitioned(config, &sender);

        let mut outcomes = Vec::new();
        for i in 0..6u8 {
            let tenant = if i % 2 == 0 { "even" } else { "odd" };
            let (done, outcome) = Done::channel();
            dispatcher
                .consume(tenant_ctx(tenant), RecordBatch::single(vec![i]), done)
                .await;
            outcomes.push(outcome);
        }
        for outcome in outcomes {
            assert!(outcome.await.unwrap().is_ok());
        }

        dispatcher.shutdown().await.unwrap();

        assert_eq!(dispatcher.shard_count(), 2);
        assert_eq!(sender.peak_in_flight(), 1);
        let sends = sender.sends();
        assert_eq!(sends.len(), 2);
        assert!(sends.iter().all(|s| s.records.len() == 3));
        assert_eq!(dispatcher.total_metrics().batches_flushed, 2);
    }
}
