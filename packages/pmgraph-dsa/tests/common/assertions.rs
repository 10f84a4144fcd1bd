//! Domain-specific assertions over stage results

use pmgraph_dsa::features::heap_graph::{GlobalValue, NodeFlags, Value};
use pmgraph_dsa::features::ir::{FunctionId, GlobalId};
use pmgraph_dsa::{DataStructureInfo, HeapGraph};

/// Assert that the stage answers with one graph instance for both functions
pub fn assert_shares_graph(stage: &dyn DataStructureInfo, a: FunctionId, b: FunctionId) {
    let ga = stage.graph(a).expect("graph for first function");
    let gb = stage.graph(b).expect("graph for second function");
    assert!(
        std::ptr::eq(ga, gb),
        "{} and {} should share a graph in the {} stage",
        a,
        b,
        stage.stage_kind()
    );
}

/// Assert that every listed function has a graph in the stage
pub fn assert_has_graphs(stage: &dyn DataStructureInfo, functions: &[FunctionId]) {
    for f in functions {
        assert!(
            stage.has_graph(*f),
            "{} has no graph in the {} stage",
            f,
            stage.stage_kind()
        );
    }
}

/// Assert that the scalar bound to `value` points at a node with `flags`
pub fn assert_node_flags(graph: &HeapGraph, value: Value, flags: NodeFlags) {
    let h = graph
        .scalar(value)
        .unwrap_or_else(|| panic!("{:?} is not in the scalar map", value));
    let node = graph.node_of(h);
    assert!(
        node.flags.contains(flags),
        "{:?} has flags {} but expected {}",
        value,
        node.flags,
        flags
    );
}

/// Number of live nodes holding the global
pub fn nodes_holding(graph: &HeapGraph, gv: GlobalId) -> usize {
    let gv = GlobalValue::Variable(gv);
    graph
        .node_ids()
        .filter(|id| graph.node(*id).globals.contains(&gv))
        .count()
}

pub fn global_value(gv: GlobalId) -> Value {
    Value::Global(GlobalValue::Variable(gv))
}
