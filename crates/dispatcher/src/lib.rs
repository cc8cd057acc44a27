//! # Dispatcher
//!
//! Sharded batching dispatcher.
//!
//! Responsibilities:
//! - Route each request to the shard of its partition key
//! - Create shards lazily, exactly once per key, under concurrent first use
//! - Bound concurrent downstream sends across all shards with one worker pool
//! - Shut every shard down in parallel

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod senders;
pub mod shard;
pub mod worker_pool;

pub use contracts::{BatchSender, CallContext, Done, Partitioner, Request};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherState, PartitionKey};
pub use error::DispatcherError;
pub use metrics::{MetricsSnapshot, ShardMetrics};
pub use registry::ShardRegistry;
pub use senders::LogSender;
pub use shard::{ShardBatcher, ShardSettings, ShardState};
pub use worker_pool::{WorkerPermit, WorkerPool};
