//! BatchSender trait - downstream output interface
//!
//! Defines the abstract interface shards forward flushed batches to.

use crate::{CallContext, ContractError, Request};

/// Downstream send trait
///
/// Invoked by a shard once per flushed batch, after it acquired a worker permit.
#[trait_variant::make(BatchSender: Send)]
pub trait LocalBatchSender {
    /// Request type carried by batches
    type Request: Request;

    /// Sender name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Transmit one batch
    ///
    /// # Errors
    /// Returns send error (should include context); it is delivered to the
    /// completion callback of every request in the batch.
    async fn send(&self, ctx: &CallContext, batch: Self::Request) -> Result<(), ContractError>;
}
