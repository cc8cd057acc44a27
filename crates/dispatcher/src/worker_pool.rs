//! WorkerPool - global bound on concurrent downstream sends
//!
//! One pool is shared by every shard of a dispatcher, which makes the bound
//! global rather than per partition. Only a shard's flush path acquires
//! permits; a permit is released when it is dropped.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DispatcherError;

/// Shared counting semaphore; `None` means unbounded.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Option<Arc<Semaphore>>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool with `max_workers` permits (0 = unbounded)
    pub fn new(max_workers: usize) -> Self {
        let permits = (max_workers > 0).then(|| Arc::new(Semaphore::new(max_workers)));
        Self {
            permits,
            capacity: max_workers,
        }
    }

    /// Pool that never blocks
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Configured capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.permits.as_ref().map(|_| self.capacity)
    }

    /// Wait for a permit
    ///
    /// Returns immediately for an unbounded pool.
    pub async fn acquire(&self) -> Result<WorkerPermit, DispatcherError> {
        let Some(permits) = &self.permits else {
            return Ok(WorkerPermit { _permit: None });
        };
        let permit = Arc::clone(permits)
            .acquire_owned()
            .await
            .map_err(|_| DispatcherError::WorkerPoolClosed)?;
        Ok(WorkerPermit {
            _permit: Some(permit),
        })
    }
}

/// Permit held for the duration of one downstream send
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: Option<OwnedSemaphorePermit>,
}
