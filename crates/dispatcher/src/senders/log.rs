//! LogSender - logs batch summaries via tracing

use std::marker::PhantomData;

use contracts::{BatchSender, CallContext, ContractError, Request};
use tracing::{info, instrument};

/// Sender that logs batch summaries instead of transmitting them
pub struct LogSender<R> {
    name: String,
    _request: PhantomData<fn() -> R>,
}

impl<R> LogSender<R> {
    /// Create a new LogSender with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _request: PhantomData,
        }
    }
}

impl<R: Request> BatchSender for LogSender<R> {
    type Request = R;

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sender_send", skip_all, fields(sender = %self.name))]
    async fn send(&self, ctx: &CallContext, batch: R) -> Result<(), ContractError> {
        info!(
            sender = %self.name,
            items = batch.items_count(),
            bytes = batch.byte_size(),
            metadata = ?ctx.metadata_map(),
            "Batch received"
        );
        Ok(())
    }
}
