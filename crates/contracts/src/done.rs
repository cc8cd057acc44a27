//! Done - per-request completion callback
//!
//! A request's outcome is only ever reported through its `Done`; the shard
//! that owns the request completes it once the request's batch was sent (or
//! could not be).

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::ContractError;

/// Outcome delivered to a completion callback.
///
/// The error is shared because one failed send completes every request merged
/// into the batch.
pub type DoneResult = Result<(), Arc<ContractError>>;

/// One-shot completion callback.
pub struct Done(Box<dyn FnOnce(DoneResult) + Send>);

impl Done {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(DoneResult) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Callback that ignores the outcome
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Callback paired with a receiver that yields the outcome
    pub fn channel() -> (Self, oneshot::Receiver<DoneResult>) {
        let (tx, rx) = oneshot::channel();
        let done = Self::new(move |result| {
            // Receiver may have been dropped by an uninterested caller
            let _ = tx.send(result);
        });
        (done, rx)
    }

    /// Deliver the outcome
    pub fn complete(self, result: DoneResult) {
        (self.0)(result)
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_outcome() {
        let (done, rx) = Done::channel();
        done.complete(Err(Arc::new(ContractError::send("boom"))));

        let outcome = rx.await.unwrap();
        assert!(outcome.unwrap_err().to_string().contains("boom"));
    }

    #[test]
    fn test_complete_with_dropped_receiver() {
        let (done, rx) = Done::channel();
        drop(rx);
        done.complete(Ok(()));
    }
}
