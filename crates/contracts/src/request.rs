//! Request - the unit of work accepted by the dispatcher

/// A telemetry request that can be sized and merged into a batch.
pub trait Request: Send + 'static {
    /// Number of telemetry items carried by the request
    fn items_count(&self) -> usize;

    /// Approximate encoded size in bytes
    fn byte_size(&self) -> usize;

    /// Fold `other` into `self`, producing one larger request
    fn merge(&mut self, other: Self)
    where
        Self: Sized;
}
