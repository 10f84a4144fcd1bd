//! Stage 3: push caller-side structure down into callees
//!
//! Graphs are visited callers first. Before a graph is visited, every caller
//! that reaches it has left a caller edge behind; visiting the graph merges
//! the actual side of those call sites into its formals. Callers with
//! several targets at one call go through a merged call record per sorted
//! target set, so N callers of M targets cost N + M merges instead of N * M.

use super::post_order::top_down_order;
use crate::config::DsaConfig;
use crate::errors::{DsaError, Result};
use crate::features::bottom_up::{entry_function, known_targets, BottomUpGraphs};
use crate::features::data_structures::{
    ActualCallees, DataStructureInfo, GraphId, StageGraphs, StageKind,
};
use crate::features::heap_graph::{
    accumulate_call_site, clone_globals_from, merge_caller_sites, CalleeRef, CloneFlags,
    DsCallSite, HeapGraph, MarkFlags,
};
use crate::features::ir::{CallInstId, FunctionId, Linkage, Module};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopDownStats {
    pub graphs: usize,
    pub caller_edges: usize,
    pub memo_graphs: usize,
    pub memo_hits: usize,
    pub new_callees: usize,
    pub args_remain_incomplete: usize,
}

/// Result of the top-down stage
#[derive(Debug, Clone)]
pub struct TopDownGraphs {
    graphs: StageGraphs,
    args_remain_incomplete: BTreeSet<FunctionId>,
    pub stats: TopDownStats,
}

impl DataStructureInfo for TopDownGraphs {
    fn stage(&self) -> &StageGraphs {
        &self.graphs
    }
}

impl TopDownGraphs {
    /// Whether callers outside the analysis may still pass anything to `f`
    pub fn args_remain_incomplete(&self, f: FunctionId) -> bool {
        self.args_remain_incomplete.contains(&f)
    }

    pub fn incomplete_arg_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.args_remain_incomplete.iter().copied()
    }

    /// Graph of `f`, synthesizing one for functions never analyzed
    ///
    /// Fails with [`DsaError::UnknownFunction`] when `f` is not a function
    /// of `module`.
    pub fn graph_or_synthesize(&mut self, module: &Module, f: FunctionId) -> Result<&HeapGraph> {
        if module.try_function(f).is_none() {
            return Err(DsaError::UnknownFunction(f.to_string()));
        }
        let id = self.graphs.synthesize_external_graph(module, f);
        Ok(self.graphs.graph(id))
    }
}

/// Where the actual side of a caller edge lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CallerSite {
    /// A call record in another graph of the stage
    Graph(GraphId, CallInstId),
    /// The accumulated call record of a multi-target memo
    Memo(usize),
}

/// Graph holding the actual side; sites in one caller share a cloner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CallerGraph {
    Stage(GraphId),
    Memo(usize),
}

impl CallerSite {
    fn caller_graph(self) -> CallerGraph {
        match self {
            CallerSite::Graph(g, _) => CallerGraph::Stage(g),
            CallerSite::Memo(i) => CallerGraph::Memo(i),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CallerEdge {
    site: CallerSite,
    callee: FunctionId,
}

/// Caller-side graph of a multi-target call set
struct IndirectCallMemo {
    graph: HeapGraph,
    call: DsCallSite,
}

struct TopDownPass<'a> {
    module: &'a Module,
    stage: StageGraphs,
    /// Callees known before this stage ran; caller edges follow these only
    bu_callees: ActualCallees,
    caller_edges: FxHashMap<GraphId, Vec<CallerEdge>>,
    memos: Vec<IndirectCallMemo>,
    memo_index: BTreeMap<Vec<FunctionId>, usize>,
    /// Share one memo between calls with the same target set
    memoize: bool,
    args_remain_incomplete: BTreeSet<FunctionId>,
    stats: TopDownStats,
}

impl<'a> TopDownPass<'a> {
    fn new(module: &'a Module, bu: &BottomUpGraphs, entry: Option<FunctionId>, memoize: bool) -> Self {
        let mut stage = bu.stage().clone();
        stage.kind = StageKind::TopDown;
        let bu_callees = stage.actual_callees.clone();

        let mut args_remain_incomplete: BTreeSet<FunctionId> = module
            .functions
            .iter()
            .filter(|f| f.linkage == Linkage::External)
            .map(|f| f.id)
            .collect();
        args_remain_incomplete.extend(entry);
        args_remain_incomplete.extend(functions_reachable_from_globals(&stage.globals_graph));

        Self {
            module,
            stage,
            bu_callees,
            caller_edges: FxHashMap::default(),
            memos: Vec::new(),
            memo_index: BTreeMap::new(),
            memoize,
            args_remain_incomplete,
            stats: TopDownStats::default(),
        }
    }

    /// Merge every recorded caller into `g`, then leave edges for its callees
    fn inline_callers_into_graph(&mut self, g: GraphId) {
        let mut graph = self.stage.arena.take(g);
        let edges = self.caller_edges.remove(&g).unwrap_or_default();

        if edges.is_empty() {
            self.args_remain_incomplete
                .extend(graph.represented_functions());
        } else {
            self.merge_callers(&mut graph, &edges);
        }

        let set = &self.args_remain_incomplete;
        let mut flags = MarkFlags::IGNORE_GLOBALS;
        if graph.represented_functions().any(|f| set.contains(&f)) {
            flags |= MarkFlags::MARK_FORMAL_ARGS;
        }
        graph.mask_incomplete_markers();
        graph.mark_incomplete_nodes(flags, |f| set.contains(&f));
        graph.remove_dead_nodes(
            false,
            Some(&mut self.stage.globals_graph),
            &mut self.stage.global_ecs,
        );

        self.record_new_callees(&graph);
        self.add_caller_edges(g, &graph);
        self.stage.arena.restore(g, graph);
    }

    fn merge_callers(&mut self, graph: &mut HeapGraph, edges: &[CallerEdge]) {
        let StageGraphs {
            arena,
            globals_graph,
            global_ecs,
            ..
        } = &mut self.stage;
        clone_globals_from(graph, globals_graph, CloneFlags::STRIP_MOD_REF_BITS, global_ecs);

        let mut grouped: BTreeMap<CallerGraph, Vec<(FunctionId, DsCallSite)>> = BTreeMap::new();
        for edge in edges {
            let (caller_graph, cs) = match edge.site {
                CallerSite::Graph(cg, call) => {
                    let caller_graph = arena.graph(cg);
                    let cs = caller_graph
                        .function_call(call)
                        .unwrap_or_else(|| panic!("caller edge to missing call {}", call));
                    (caller_graph, cs)
                }
                CallerSite::Memo(i) => (&self.memos[i].graph, &self.memos[i].call),
            };
            grouped
                .entry(edge.site.caller_graph())
                .or_default()
                .push((edge.callee, caller_graph.resolved_call(cs)));
        }

        let flags = CloneFlags::DONT_CLONE_CALL_NODES | CloneFlags::DONT_CLONE_AUX_CALL_NODES;
        for (caller, sites) in grouped {
            let caller_graph = match caller {
                CallerGraph::Stage(cg) => arena.graph(cg),
                CallerGraph::Memo(i) => &self.memos[i].graph,
            };
            merge_caller_sites(graph, caller_graph, &sites, flags, global_ecs);
            trace!(sites = sites.len(), nodes = graph.node_count(), "merged caller sites");
        }
    }

    /// Indirect targets that became visible once callers were merged
    fn record_new_callees(&mut self, graph: &HeapGraph) {
        for cs in graph.function_calls().iter().filter(|cs| cs.is_indirect()) {
            for f in known_targets(graph, cs) {
                if self.stage.actual_callees.insert(cs.call, f) {
                    self.stats.new_callees += 1;
                    debug!(call = %cs.call, callee = %self.module.function(f).name, "new indirect callee");
                }
            }
        }
    }

    fn add_caller_edges(&mut self, g: GraphId, graph: &HeapGraph) {
        for cs in graph.function_calls() {
            let callees: Vec<FunctionId> = match cs.callee {
                CalleeRef::Direct(f) => vec![f],
                CalleeRef::Indirect(_) => self.bu_callees.callees(cs.call).collect(),
            };
            let callees: Vec<FunctionId> = callees
                .into_iter()
                .filter(|f| self.module.function(*f).has_body())
                .filter(|f| self.stage.graph_id(*f) != Some(g))
                .collect();

            match callees.as_slice() {
                [] => {}
                [callee] => self.push_edge(*callee, CallerSite::Graph(g, cs.call)),
                _ => self.add_memo_edge(graph, cs, callees),
            }
        }
    }

    /// Route a multi-target call through a memo graph
    ///
    /// With memoization off every call gets a memo of its own.
    fn add_memo_edge(&mut self, graph: &HeapGraph, cs: &DsCallSite, callees: Vec<FunctionId>) {
        let shared = if self.memoize {
            self.memo_index.get(&callees).copied()
        } else {
            None
        };
        let idx = match shared {
            Some(idx) => {
                self.stats.memo_hits += 1;
                debug!(callees = callees.len(), "reusing indirect-call memo");
                idx
            }
            None => {
                let idx = self.memos.len();
                self.memos.push(IndirectCallMemo {
                    graph: HeapGraph::new(),
                    call: DsCallSite {
                        call: cs.call,
                        caller: cs.caller,
                        callee: CalleeRef::Direct(callees[0]),
                        ret: None,
                        args: Vec::new(),
                    },
                });
                for f in &callees {
                    self.push_edge(*f, CallerSite::Memo(idx));
                }
                if self.memoize {
                    self.memo_index.insert(callees, idx);
                }
                self.stats.memo_graphs += 1;
                idx
            }
        };

        let IndirectCallMemo { graph: memo, call } = &mut self.memos[idx];
        accumulate_call_site(memo, call, graph, cs, &mut self.stage.global_ecs);
    }

    fn push_edge(&mut self, callee: FunctionId, site: CallerSite) {
        let Some(target) = self.stage.graph_id(callee) else {
            return;
        };
        self.caller_edges
            .entry(target)
            .or_default()
            .push(CallerEdge { site, callee });
        self.stats.caller_edges += 1;
    }
}

/// Functions whose address is reachable from a global variable
///
/// Anything stored in a global may be called from outside the analyzed
/// call graph.
fn functions_reachable_from_globals(gg: &HeapGraph) -> BTreeSet<FunctionId> {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<_> = gg
        .global_entries()
        .filter(|(gv, _)| gv.is_variable())
        .map(|(_, h)| gg.resolve(h).node)
        .collect();
    let mut functions = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        functions.extend(gg.node(id).functions());
        stack.extend(gg.links_of(id).into_iter().map(|(_, t)| t.node));
    }
    functions
}

/// Propagate caller information top-down over the bottom-up graphs
pub fn run(module: &Module, bu: &BottomUpGraphs, config: &DsaConfig) -> Result<TopDownGraphs> {
    let entry = entry_function(module, config);
    let mut pass = TopDownPass::new(module, bu, entry, config.memoize_indirect_calls);

    let order = top_down_order(module, &pass.stage, entry);
    debug!(graphs = order.len(), "top-down visit order computed");
    for g in order {
        pass.inline_callers_into_graph(g);
    }

    let TopDownPass {
        mut stage,
        args_remain_incomplete,
        mut stats,
        ..
    } = pass;
    stage.globals_graph.remove_trivially_dead_nodes();

    stats.graphs = stage.arena.len();
    stats.args_remain_incomplete = args_remain_incomplete.len();
    info!(
        graphs = stats.graphs,
        caller_edges = stats.caller_edges,
        memo_graphs = stats.memo_graphs,
        memo_hits = stats.memo_hits,
        new_callees = stats.new_callees,
        "top-down closure done"
    );
    Ok(TopDownGraphs {
        graphs: stage,
        args_remain_incomplete,
        stats,
    })
}
