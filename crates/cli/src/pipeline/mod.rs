//! Pipeline orchestration module.

mod orchestrator;
mod sender;
mod stats;

pub use orchestrator::{LoadProfile, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
