//! Sizer - request size estimation used by shards to drive flush thresholds

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Request;

/// Estimates a request's contribution to a batch size.
pub trait Sizer<R>: Send + Sync {
    /// Size of `request` in the sizer's unit
    fn size(&self, request: &R) -> usize;
}

/// Counts telemetry items
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemsSizer;

/// Counts encoded bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSizer;

/// Counts requests (each request is 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestsSizer;

impl<R: Request> Sizer<R> for ItemsSizer {
    fn size(&self, request: &R) -> usize {
        request.items_count()
    }
}

impl<R: Request> Sizer<R> for BytesSizer {
    fn size(&self, request: &R) -> usize {
        request.byte_size()
    }
}

impl<R> Sizer<R> for RequestsSizer {
    fn size(&self, _request: &R) -> usize {
        1
    }
}

/// Unit in which batch sizes are measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizerType {
    /// Telemetry items (spans, data points, log records)
    #[default]
    Items,
    /// Encoded bytes
    Bytes,
    /// Whole requests
    Requests,
}

impl SizerType {
    /// Build the sizer implementing this unit
    pub fn sizer<R: Request>(self) -> Arc<dyn Sizer<R>> {
        match self {
            SizerType::Items => Arc::new(ItemsSizer),
            SizerType::Bytes => Arc::new(BytesSizer),
            SizerType::Requests => Arc::new(RequestsSizer),
        }
    }
}
