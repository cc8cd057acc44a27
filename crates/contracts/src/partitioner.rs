//! Partitioner - derives the partition key of a request

use std::fmt;
use std::hash::Hash;

use crate::CallContext;

/// Computes the partition key for a request.
///
/// Implementations must be deterministic for a given context and request and
/// must not mutate either.
pub trait Partitioner<R>: Send + Sync {
    /// Key type; compared by equality
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    /// Compute the partition key
    fn key(&self, ctx: &CallContext, request: &R) -> Self::Key;
}

/// Key produced by [`MetadataPartitioner`]: one slot per configured metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey(Vec<Option<String>>);

impl MetadataKey {
    /// Build a key from its values
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    /// Metadata values, in configured key order
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(value.as_deref().unwrap_or("-"))?;
        }
        Ok(())
    }
}

/// Partitions requests by the values of selected call-context metadata keys.
///
/// Requests missing a key share the partition with every other request that
/// misses it.
#[derive(Debug, Clone)]
pub struct MetadataPartitioner {
    keys: Vec<String>,
}

impl MetadataPartitioner {
    /// Create a partitioner over the given metadata keys
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured metadata keys
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl<R> Partitioner<R> for MetadataPartitioner {
    type Key = MetadataKey;

    fn key(&self, ctx: &CallContext, _request: &R) -> MetadataKey {
        MetadataKey(
            self.keys
                .iter()
                .map(|k| ctx.metadata(k).map(str::to_owned))
                .collect(),
        )
    }
}
