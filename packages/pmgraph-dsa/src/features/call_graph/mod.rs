//! # Call Graph View
//!
//! Function-level call graph induced by a stage's resolved callees, with
//! SCC detection and DOT export for diagnostics.

use crate::features::data_structures::{ActualCallees, DataStructureInfo};
use crate::features::ir::{CallInstId, FunctionId, Module};
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::BTreeMap;

/// Directed graph where:
/// - Nodes are functions (every function of the module, defined or not)
/// - Edges are resolved calls, `caller -> callee`, weighted by the call
pub struct CallGraphView {
    graph: DiGraph<FunctionId, CallInstId>,
    index: BTreeMap<FunctionId, NodeIndex>,
}

impl CallGraphView {
    /// Build from a resolved-callee index
    pub fn from_callees(module: &Module, callees: &ActualCallees) -> Self {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        for f in &module.functions {
            index.insert(f.id, graph.add_node(f.id));
        }

        for (call, callee) in callees.iter() {
            let Some(caller) = module.call_owner(call) else {
                continue;
            };
            graph.add_edge(index[&caller], index[&callee], call);
        }
        Self { graph, index }
    }

    /// Build from any stage result
    pub fn from_stage(module: &Module, info: &impl DataStructureInfo) -> Self {
        Self::from_callees(module, info.actual_callees())
    }

    fn neighbors(&self, f: FunctionId, dir: Direction) -> Vec<FunctionId> {
        let Some(&idx) = self.index.get(&f) else {
            return Vec::new();
        };
        let mut out: Vec<FunctionId> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n])
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Functions `f` may call
    pub fn callees(&self, f: FunctionId) -> Vec<FunctionId> {
        self.neighbors(f, Direction::Outgoing)
    }

    /// Functions that may call `f`
    pub fn callers(&self, f: FunctionId) -> Vec<FunctionId> {
        self.neighbors(f, Direction::Incoming)
    }

    /// Mutually recursive groups (size > 1, or a function calling itself)
    pub fn recursive_groups(&self) -> Vec<Vec<FunctionId>> {
        let mut groups: Vec<Vec<FunctionId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut fs: Vec<FunctionId> = scc.into_iter().map(|n| self.graph[n]).collect();
                fs.sort();
                fs
            })
            .collect();
        groups.sort();
        groups
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Graphviz rendering with function names as labels
    pub fn to_dot(&self, module: &Module) -> String {
        let named = self.graph.map(
            |_, f| module.function(*f).name.clone(),
            |_, call| call.to_string(),
        );
        format!("{}", Dot::with_config(&named, &[Config::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::ModuleBuilder;

    fn sample() -> (Module, ActualCallees, [FunctionId; 3]) {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.declare("f", 0);
        let g = mb.declare("g", 0);
        let mut calls = Vec::new();
        mb.define(f, |b| {
            calls.push(b.call_void(g, vec![]));
            b.ret_void();
        });
        mb.define(g, |b| {
            calls.push(b.call_void(f, vec![]));
            b.ret_void();
        });
        let main = mb.function("main", 0, |b| {
            calls.push(b.call_void(f, vec![]));
            b.ret_void();
        });
        let module = mb.build().unwrap();

        let mut callees = ActualCallees::new();
        callees.insert(calls[0], g);
        callees.insert(calls[1], f);
        callees.insert(calls[2], f);
        (module, callees, [f, g, main])
    }

    #[test]
    fn test_callers_and_callees() {
        let (module, callees, [f, g, main]) = sample();
        let cg = CallGraphView::from_callees(&module, &callees);
        assert_eq!(cg.callees(main), vec![f]);
        assert_eq!(cg.callers(f), vec![g, main]);
        assert_eq!(cg.edge_count(), 3);
    }

    #[test]
    fn test_recursive_groups() {
        let (module, callees, [f, g, _]) = sample();
        let cg = CallGraphView::from_callees(&module, &callees);
        assert_eq!(cg.recursive_groups(), vec![vec![f, g]]);
    }

    #[test]
    fn test_dot_uses_function_names() {
        let (module, callees, _) = sample();
        let dot = CallGraphView::from_callees(&module, &callees).to_dot(&module);
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("\"main\""));
    }
}
