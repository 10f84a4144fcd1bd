//! Pipeline orchestration
//!
//! Runs the five stages in order, each consuming the previous result.

pub mod orchestrator;
pub mod result;

pub use orchestrator::DsaPipeline;
pub use result::{PipelineOutput, PipelineStats};
