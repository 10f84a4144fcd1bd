//! # Data Structure Bookkeeping
//!
//! Graph arena, resolved-callee index and the per-stage container shared by
//! all analysis stages, plus the [`DataStructureInfo`] query port.

pub mod domain;
pub mod ports;

pub use crate::features::heap_graph::GlobalEquivalenceClasses;
pub use domain::{ActualCallees, GraphArena, GraphId, StageGraphs, StageKind, StageSummary};
pub use ports::DataStructureInfo;
