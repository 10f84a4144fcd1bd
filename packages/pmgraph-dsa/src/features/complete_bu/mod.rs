//! # Complete Bottom-Up Closure
//!
//! Stage 4: the bottom-up algorithm rerun over the call graph completed by
//! the earlier stages, entry function first. Afterwards the entry graph
//! holds every global variable of the globals graph.

pub mod analysis;

pub(crate) use analysis::defined_callees;
pub use analysis::{run, CompleteGraphs, CompleteStats};
