//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Shard worker task ended abnormally
    #[error("worker task of shard '{partition}' failed: {message}")]
    ShardTask { partition: String, message: String },

    /// Worker pool semaphore was closed
    #[error("worker pool closed")]
    WorkerPoolClosed,
}

impl DispatcherError {
    /// Create a shard task error
    pub fn shard_task(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShardTask {
            partition: partition.into(),
            message: message.into(),
        }
    }
}
