//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the batching pipeline:
//! the request model, the collaborator traits a dispatcher is built from
//! (partitioner, sizer, downstream sender), completion callbacks and the
//! configuration schema.
//!
//! All business crates depend on this crate; reverse dependencies are prohibited.

mod batcher_config;
mod context;
mod done;
mod error;
mod partitioner;
mod record;
mod request;
mod sender;
mod sizer;

pub use batcher_config::*;
pub use context::CallContext;
pub use done::{Done, DoneResult};
pub use error::*;
pub use partitioner::{MetadataKey, MetadataPartitioner, Partitioner};
pub use record::RecordBatch;
pub use request::Request;
pub use sender::{BatchSender, LocalBatchSender};
pub use sizer::*;
