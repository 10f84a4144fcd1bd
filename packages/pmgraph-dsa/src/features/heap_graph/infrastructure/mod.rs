pub mod cleanup;
pub mod cloner;
pub mod graph;
pub mod inline;
pub mod printer;

pub use cloner::{clone_globals_from, clone_into, export_globals_into, ReachabilityCloner};
pub use graph::HeapGraph;
pub use inline::{
    accumulate_call_site, merge_caller_site, merge_caller_sites, merge_in_graph,
    unify_call_with_entry,
};
pub use printer::{GraphSummary, NodeSummary};
