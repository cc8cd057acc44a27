//! CallContext - per-call context forwarded from ingestion to the shards
//!
//! Carries client metadata (e.g. tenant or auth headers) that partitioners
//! derive keys from. Uses `Arc` internally so cloning is O(1).

use std::collections::HashMap;
use std::sync::Arc;

/// Per-call context.
///
/// # Examples
/// ```
/// use contracts::CallContext;
///
/// let ctx = CallContext::new().with_metadata("tenant", "acme");
/// assert_eq!(ctx.metadata("tenant"), Some("acme"));
/// assert_eq!(ctx.metadata("region"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    metadata: Arc<HashMap<String, String>>,
}

impl CallContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from existing metadata
    pub fn from_metadata(metadata: HashMap<String, String>) -> Self {
        Self {
            metadata: Arc::new(metadata),
        }
    }

    /// Return a copy of this context with `key` set to `value`
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.metadata).insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// All metadata entries
    pub fn metadata_map(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}
