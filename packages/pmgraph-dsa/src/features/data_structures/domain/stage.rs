//! Per-stage graph container
//!
//! Every stage owns one [`StageGraphs`]: the graph arena, the function →
//! graph map, the distinguished globals graph and the two structures that
//! are threaded through the whole pipeline (global equivalence classes and
//! resolved callees).

use super::actual_callees::ActualCallees;
use super::graph_arena::{GraphArena, GraphId};
use crate::features::heap_graph::{
    clone_into, CloneFlags, FunctionEntry, GlobalEquivalenceClasses, GraphSummary, HeapGraph,
    NodeFlags, NodeHandle, Value,
};
use crate::features::ir::{FunctionId, Module};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Local,
    BottomUp,
    TopDown,
    CompleteBottomUp,
    EquivalenceClasses,
}

impl StageKind {
    /// Every stage in pipeline order
    pub const ALL: [StageKind; 5] = [
        StageKind::Local,
        StageKind::BottomUp,
        StageKind::TopDown,
        StageKind::CompleteBottomUp,
        StageKind::EquivalenceClasses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Local => "local",
            StageKind::BottomUp => "bottom-up",
            StageKind::TopDown => "top-down",
            StageKind::CompleteBottomUp => "complete bottom-up",
            StageKind::EquivalenceClasses => "equivalence-class",
        }
    }

    /// Stages that synthesize graphs for functions they never saw
    pub fn synthesizes_missing_graphs(&self) -> bool {
        matches!(self, StageKind::BottomUp | StageKind::TopDown)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StageGraphs {
    pub kind: StageKind,
    pub arena: GraphArena,
    /// Function → its (possibly shared) graph
    pub info: BTreeMap<FunctionId, GraphId>,
    pub globals_graph: HeapGraph,
    pub global_ecs: GlobalEquivalenceClasses,
    pub actual_callees: ActualCallees,
}

impl StageGraphs {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            arena: GraphArena::new(),
            info: BTreeMap::new(),
            globals_graph: HeapGraph::new(),
            global_ecs: GlobalEquivalenceClasses::new(),
            actual_callees: ActualCallees::new(),
        }
    }

    pub fn graph_id(&self, f: FunctionId) -> Option<GraphId> {
        self.info.get(&f).copied()
    }

    pub fn has_graph(&self, f: FunctionId) -> bool {
        self.info.contains_key(&f)
    }

    pub fn graph_of(&self, f: FunctionId) -> Option<&HeapGraph> {
        self.graph_id(f).and_then(|id| self.arena.get(id))
    }

    pub fn graph(&self, id: GraphId) -> &HeapGraph {
        self.arena.graph(id)
    }

    pub fn graph_mut(&mut self, id: GraphId) -> &mut HeapGraph {
        self.arena.graph_mut(id)
    }

    /// Add a graph and point every function it represents at it
    pub fn insert_graph(&mut self, graph: HeapGraph) -> GraphId {
        let functions: Vec<FunctionId> = graph.represented_functions().collect();
        let id = self.arena.insert(graph);
        for f in functions {
            self.info.insert(f, id);
        }
        id
    }

    /// Fold `other` into `root` and repoint `other`'s functions
    pub fn collapse_into(&mut self, root: GraphId, other: GraphId) {
        let absorbed = self.arena.take(other);
        let functions: Vec<FunctionId> = absorbed.represented_functions().collect();
        clone_into(
            &absorbed,
            self.arena.graph_mut(root),
            CloneFlags::empty(),
            &mut self.global_ecs,
        );
        for f in &functions {
            self.info.insert(*f, root);
        }
        debug!(stage = %self.kind, root = %root, absorbed = %other, functions = functions.len(), "collapsed graph into SCC root");
    }

    /// Graph for a function outside the analyzed bodies
    ///
    /// Parameters, return value and varargs all point at external,
    /// incomplete nodes. Cached like any other graph.
    pub fn synthesize_external_graph(&mut self, module: &Module, f: FunctionId) -> GraphId {
        assert!(
            self.kind.synthesizes_missing_graphs(),
            "{} stage cannot synthesize graphs",
            self.kind
        );
        if let Some(id) = self.graph_id(f) {
            return id;
        }

        let func = module.function(f);
        let external = NodeFlags::EXTERNAL | NodeFlags::INCOMPLETE;
        let mut graph = HeapGraph::new();
        let mut entry = FunctionEntry::default();
        for param in &func.params {
            let h = NodeHandle::at(graph.add_node(external));
            graph.bind_scalar(Value::Local(f, *param), h, &mut self.global_ecs);
            entry.args.push(h);
        }
        entry.ret = Some(NodeHandle::at(graph.add_node(external)));
        if func.is_varargs {
            entry.vararg = Some(NodeHandle::at(graph.add_node(external)));
        }
        graph.set_entry(f, entry, &mut self.global_ecs);
        debug!(stage = %self.kind, function = %func.name, "synthesized graph for external function");
        self.insert_graph(graph)
    }

    /// Distinct live graphs with the functions they represent
    pub fn graphs(&self) -> impl Iterator<Item = (GraphId, &HeapGraph)> + '_ {
        self.arena.iter()
    }

    /// Textual dump of every graph plus the globals graph
    pub fn print(&self, module: &Module) -> String {
        let mut out = format!("=== {} data structures ===\n", self.kind);
        for (_, graph) in self.graphs() {
            out.push_str(&graph.print(module));
        }
        out.push_str("globals ");
        out.push_str(&self.globals_graph.print(module));
        out
    }

    pub fn summary(&self, module: &Module) -> StageSummary {
        StageSummary {
            stage: self.kind,
            graphs: self.graphs().map(|(_, g)| g.summary(module)).collect(),
            globals_graph: self.globals_graph.summary(module),
            actual_callees: self
                .actual_callees
                .iter()
                .map(|(call, f)| (call.to_string(), module.function(f).name.clone()))
                .collect(),
            global_classes: self
                .global_ecs
                .non_trivial_classes()
                .values()
                .map(|members| members.iter().map(|gv| gv.to_string()).collect())
                .collect(),
        }
    }
}

/// Serializable overview of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: StageKind,
    pub graphs: Vec<GraphSummary>,
    pub globals_graph: GraphSummary,
    pub actual_callees: Vec<(String, String)>,
    pub global_classes: Vec<Vec<String>>,
}
