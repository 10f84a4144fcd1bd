//! Tarjan-style post-order over graphs with in-place SCC collapse
//!
//! Shared by every bottom-up flavoured stage. A stage plugs in through
//! [`SccClosure`]: which functions a graph calls, how a callee's graph is
//! obtained (get-or-create), and what "closing" a graph means once all of
//! its callees are closed.
//!
//! Low-link values are keyed by graph, not by function, so functions that
//! already share a graph are one vertex. When a root finds its SCC complete,
//! every graph above it on the stack is cloned into the root's graph and
//! dropped from the arena.
//!
//! # References
//! - Tarjan, R. "Depth-First Search and Linear Graph Algorithms" (1972)

use crate::features::data_structures::{GraphId, StageGraphs};
use crate::features::ir::FunctionId;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Low-link value of a finished graph
const DONE: u32 = u32::MAX;

/// Stage-specific half of the SCC traversal
pub trait SccClosure {
    fn stage_mut(&mut self) -> &mut StageGraphs;

    /// Functions whose graphs must be closed before `g`
    fn callee_functions(&mut self, g: GraphId) -> Vec<FunctionId>;

    /// Graph of a callee, created on first request
    fn graph_for(&mut self, f: FunctionId) -> GraphId;

    /// Inline callees into `g` and clean it up
    fn process_graph(&mut self, g: GraphId);

    /// Whether processing exposed callees that justify another round
    fn needs_revisit(&mut self, _g: GraphId) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SccStats {
    /// Graphs absorbed into an SCC root
    pub collapsed_graphs: usize,
    pub largest_scc: usize,
    pub revisits: usize,
}

#[derive(Debug)]
pub struct SccEngine {
    stack: Vec<GraphId>,
    next_id: u32,
    val_map: FxHashMap<GraphId, u32>,
    pub stats: SccStats,
}

impl Default for SccEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SccEngine {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            next_id: 1,
            val_map: FxHashMap::default(),
            stats: SccStats::default(),
        }
    }

    /// Whether a traversal has already reached `g`
    pub fn has_visited(&self, g: GraphId) -> bool {
        self.val_map.contains_key(&g)
    }

    /// Visit `f`'s graph unless an earlier traversal already closed it
    pub fn visit_function<C: SccClosure>(&mut self, closure: &mut C, f: FunctionId) {
        let g = closure.graph_for(f);
        if !self.has_visited(g) {
            self.visit(closure, g);
        }
    }

    /// Close `g` and everything it reaches; returns its low-link
    pub fn visit<C: SccClosure>(&mut self, closure: &mut C, g: GraphId) -> u32 {
        assert!(
            !self.val_map.contains_key(&g),
            "graph {} revisited during SCC construction",
            g
        );
        let my_id = self.next_id;
        self.next_id += 1;
        let mut min = my_id;
        self.val_map.insert(g, my_id);
        self.stack.push(g);

        for f in closure.callee_functions(g) {
            let callee = closure.graph_for(f);
            let m = match self.val_map.get(&callee) {
                Some(&m) => m,
                None => self.visit(closure, callee),
            };
            min = min.min(m);
        }

        assert_eq!(
            self.val_map.get(&g),
            Some(&my_id),
            "SCC construction assumption wrong for graph {}",
            g
        );
        if min != my_id {
            return min;
        }

        let mut size = 1;
        while let Some(&top) = self.stack.last() {
            if top == g {
                break;
            }
            self.stack.pop();
            self.val_map.remove(&top);
            closure.stage_mut().collapse_into(g, top);
            size += 1;
        }
        self.stack.pop();

        if size > 1 {
            closure.stage_mut().graph_mut(g).remove_trivially_dead_nodes();
            self.stats.collapsed_graphs += size - 1;
            debug!(root = %g, size, "SCC collapsed");
        }
        self.stats.largest_scc = self.stats.largest_scc.max(size);

        closure.process_graph(g);

        if closure.needs_revisit(g) {
            self.stats.revisits += 1;
            self.val_map.remove(&g);
            return self.visit(closure, g);
        }
        self.val_map.insert(g, DONE);
        my_id
    }
}
