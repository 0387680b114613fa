//! Execution pipeline

pub mod executor;
pub mod paths;

pub use executor::{InstallPipeline, PipelineOptions};
