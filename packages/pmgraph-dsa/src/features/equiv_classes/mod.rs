//! # Equivalence-Class Merge
//!
//! Stage 5: functions that can be called from one call site (and functions
//! sharing a graph with them) are merged into one class graph, then the
//! bottom-up closure runs over the class graphs. Clients that must treat
//! every possible target of a call alike (pool allocation, instrumentation)
//! read this stage.

pub mod analysis;

pub use analysis::{run, EquivClassGraphs, EquivClassStats};
