//! Feature modules - one vertical slice per analysis concern
//!
//! Layered features (ir, heap_graph, data_structures) split into:
//! - domain/         - Pure data types
//! - ports/          - Query traits
//! - application/    - Builders
//! - infrastructure/ - Algorithms over the domain types
//!
//! Stage features (local → bottom_up → top_down → complete_bu → equiv_classes)
//! each expose a `run` function and a result type implementing
//! `DataStructureInfo`.

// Program model consumed by every stage
pub mod ir;

// Points-to graph: nodes, cells, call records, cloning, inlining, cleanup
pub mod heap_graph;

// Stage-neutral graph storage and the query port
pub mod data_structures;

// Stage 1: intraprocedural graphs
pub mod local;

// Stage 2: callee summaries inlined into callers, SCCs collapsed
pub mod bottom_up;

// Stage 3: caller context pushed down into callees
pub mod top_down;

// Stage 4: bottom-up again over the completed call graph
pub mod complete_bu;

// Stage 5: one graph per class of functions sharing an indirect call
pub mod equiv_classes;

// Diagnostics: function-level call graph of any stage
pub mod call_graph;
