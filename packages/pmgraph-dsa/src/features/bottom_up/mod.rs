//! # Bottom-Up Closure
//!
//! Stage 2 plus the SCC engine reused by the complete bottom-up and
//! equivalence-class stages.

pub mod analysis;
pub mod scc_engine;

pub use analysis::{run, BottomUpGraphs, BottomUpStats};
pub(crate) use analysis::{entry_function, known_targets, merge_globals_into_entry, resolvable_callees};
pub use scc_engine::{SccClosure, SccEngine, SccStats};
