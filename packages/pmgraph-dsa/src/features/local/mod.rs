//! # Local Analysis
//!
//! Stage 1: one graph per function body built from its instructions alone.
//! Calls become unresolved call-site records; nothing crosses a function
//! boundary except through the globals graph.

pub mod analysis;
pub mod builder;

pub use analysis::{run, LocalGraphs, LocalStats};
pub use builder::{build_local_graph, LocalGraphBuilder};
