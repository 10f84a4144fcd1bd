//! Caller-before-callee order over the graphs of a stage
//!
//! Vertices are graphs, not functions: a collapsed SCC is a single vertex
//! and calls inside one graph add no edge. Cycles between graphs (possible
//! through indirect targets the bottom-up closure never inlined) are broken
//! by the DFS, so each graph appears exactly once.

use crate::features::data_structures::{GraphId, StageGraphs};
use crate::features::heap_graph::CalleeRef;
use crate::features::ir::{FunctionId, Module};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use rustc_hash::{FxHashMap, FxHashSet};

/// Call graph between the live graphs of `stage`
///
/// An edge `a -> b` means some call in `a` reaches a defined function whose
/// graph is `b`. Indirect calls use the targets recorded in the stage's
/// resolved-callee index.
pub fn graph_call_graph(
    module: &Module,
    stage: &StageGraphs,
) -> (DiGraph<GraphId, ()>, FxHashMap<GraphId, NodeIndex>) {
    let mut cg = DiGraph::new();
    let mut index = FxHashMap::default();
    for (id, _) in stage.graphs() {
        index.insert(id, cg.add_node(id));
    }

    for (id, graph) in stage.graphs() {
        for cs in graph.function_calls() {
            let callees: Vec<FunctionId> = match cs.callee {
                CalleeRef::Direct(f) => vec![f],
                CalleeRef::Indirect(_) => stage.actual_callees.callees(cs.call).collect(),
            };
            for f in callees {
                if !module.function(f).has_body() {
                    continue;
                }
                let Some(callee) = stage.graph_id(f) else { continue };
                if callee != id {
                    cg.update_edge(index[&id], index[&callee], ());
                }
            }
        }
    }
    (cg, index)
}

/// Graphs in reverse post-order over the whole graph call graph
///
/// The DFS starts from every other graph in id order and from the entry
/// graph last, so the entry comes first unless another graph calls it.
/// Graphs the entry does not reach follow it, latest root first. Every
/// caller still precedes its callees outside of cycles.
pub fn top_down_order(module: &Module, stage: &StageGraphs, entry: Option<FunctionId>) -> Vec<GraphId> {
    let (cg, index) = graph_call_graph(module, stage);

    let entry_graph = entry.and_then(|f| stage.graph_id(f));
    let mut roots: Vec<NodeIndex> = stage
        .graphs()
        .filter(|(id, _)| Some(*id) != entry_graph)
        .map(|(id, _)| index[&id])
        .collect();
    if let Some(g) = entry_graph {
        roots.push(index[&g]);
    }

    let mut post_order = Vec::with_capacity(index.len());
    let mut seen = FxHashSet::default();
    let mut dfs = DfsPostOrder::empty(&cg);
    for root in roots {
        if seen.contains(&root) {
            continue;
        }
        dfs.move_to(root);
        while let Some(n) = dfs.next(&cg) {
            seen.insert(n);
            post_order.push(cg[n]);
        }
    }

    post_order.reverse();
    post_order
}
