//! Batcher configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::SizerType;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Top-level batching dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Maximum concurrent downstream sends across all shards (0 = unbounded)
    #[serde(default)]
    pub max_workers: usize,

    /// Per-shard request queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Shard flush policy
    #[serde(default)]
    pub batch: BatchConfig,

    /// Partitioning; absent means a single shard
    #[serde(default)]
    pub partition: Option<PartitionConfig>,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            max_workers: 0,
            queue_capacity: default_queue_capacity(),
            batch: BatchConfig::default(),
            partition: None,
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

/// Shard flush policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Flush a pending batch this long after it was opened (milliseconds)
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// Flush as soon as the pending batch reaches this size
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Never let a batch grow past this size (0 = no limit)
    #[serde(default)]
    pub max_size: usize,

    /// Unit batch sizes are measured in
    #[serde(default)]
    pub sizer: SizerType,
}

impl BatchConfig {
    /// Flush timeout as a `Duration`
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_timeout_ms: default_flush_timeout_ms(),
            min_size: default_min_size(),
            max_size: 0,
            sizer: SizerType::Items,
        }
    }
}

fn default_flush_timeout_ms() -> u64 {
    200
}

fn default_min_size() -> usize {
    8192
}

/// Partitioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Call-context metadata keys whose values form the partition key
    pub metadata_keys: Vec<String>,
}
