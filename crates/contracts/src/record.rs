//! RecordBatch - a request made of opaque encoded records

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Request;

/// A batch of opaque encoded telemetry records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBatch {
    /// Encoded records
    pub records: Vec<Bytes>,
}

impl RecordBatch {
    /// Create a batch from records
    pub fn new(records: Vec<Bytes>) -> Self {
        Self { records }
    }

    /// Create a batch holding a single record
    pub fn single(record: impl Into<Bytes>) -> Self {
        Self {
            records: vec![record.into()],
        }
    }
}

impl Request for RecordBatch {
    fn items_count(&self) -> usize {
        self.records.len()
    }

    fn byte_size(&self) -> usize {
        self.records.iter().map(Bytes::len).sum()
    }

    fn merge(&mut self, other: Self) {
        self.records.extend(other.records);
    }
}
