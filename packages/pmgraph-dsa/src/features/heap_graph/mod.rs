//! # Heap Graph
//!
//! Field-sensitive, unification-based points-to graph (one per function or
//! per collapsed group of functions).
//!
//! - Nodes are abstract memory objects with flags, outgoing field links and
//!   the set of globals whose storage they represent
//! - The scalar map binds program values (locals, global and function
//!   addresses) to node handles
//! - Call sites keep actual-side handles until inlined; unresolved ones stay
//!   on the auxiliary list
//!
//! ## References
//! - Lattner, C. "Macroscopic Data Structure Analysis and Optimization" (PhD 2005)
//! - Lattner, Lenharth & Adve "Making Context-Sensitive Points-to Analysis
//!   with Heap Cloning Practical for the Real World" (PLDI 2007)

pub mod domain;
pub mod infrastructure;

pub use domain::{
    CalleeRef, CloneFlags, DsCallSite, DsNode, FunctionEntry, GlobalEquivalenceClasses,
    GlobalValue, MarkFlags, NodeFlags, NodeHandle, NodeId, Value,
};
pub use infrastructure::{
    accumulate_call_site, clone_globals_from, clone_into, export_globals_into, merge_caller_site,
    merge_caller_sites, merge_in_graph, unify_call_with_entry, GraphSummary, HeapGraph, NodeSummary,
    ReachabilityCloner,
};
