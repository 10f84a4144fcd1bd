//! Stage 2: bottom-up closure over the call graph
//!
//! Every graph starts as a copy of its local graph plus the globals-graph
//! structure for the globals it mentions. Graphs are closed in post-order;
//! each unresolved call whose targets are all known and defined is inlined,
//! the rest stay on the auxiliary list for later stages.
//!
//! Calls with several possible targets are inlined through one merged graph
//! per sorted target set, shared by every call with the same set.

use super::scc_engine::{SccClosure, SccEngine, SccStats};
use crate::config::DsaConfig;
use crate::errors::{DsaError, Result};
use crate::features::data_structures::{
    DataStructureInfo, GraphArena, GraphId, StageGraphs, StageKind,
};
use crate::features::heap_graph::{
    clone_globals_from, clone_into, export_globals_into, merge_in_graph, CalleeRef, CloneFlags,
    DsCallSite, FunctionEntry, HeapGraph, MarkFlags, NodeFlags, ReachabilityCloner,
};
use crate::features::ir::{FunctionId, Module};
use crate::features::local::LocalGraphs;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottomUpStats {
    pub graphs: usize,
    pub inlined_calls: usize,
    pub indirect_call_graphs: usize,
    pub unresolved_calls: usize,
    pub collapsed_graphs: usize,
    pub largest_scc: usize,
    pub revisits: usize,
}

/// Result of the bottom-up stage
#[derive(Debug, Clone)]
pub struct BottomUpGraphs {
    graphs: StageGraphs,
    pub stats: BottomUpStats,
}

impl DataStructureInfo for BottomUpGraphs {
    fn stage(&self) -> &StageGraphs {
        &self.graphs
    }
}

impl BottomUpGraphs {
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

/// Targets of a call that can be inlined right now
///
/// Direct calls resolve when the callee has a body. Indirect calls resolve
/// only through a complete callee node whose functions all have bodies.
pub(crate) fn resolvable_callees(module: &Module, graph: &HeapGraph, cs: &DsCallSite) -> Vec<FunctionId> {
    match cs.callee {
        CalleeRef::Direct(f) if module.function(f).has_body() => vec![f],
        CalleeRef::Direct(_) => Vec::new(),
        CalleeRef::Indirect(h) => {
            let node = graph.node_of(h);
            if node.flags.intersects(NodeFlags::INCOMPLETE | NodeFlags::EXTERNAL) {
                return Vec::new();
            }
            let targets: Vec<FunctionId> = node.functions().collect();
            if targets.iter().any(|f| !module.function(*f).has_body()) {
                return Vec::new();
            }
            targets
        }
    }
}

/// Every target a call is known to have, resolvable or not
pub(crate) fn known_targets(graph: &HeapGraph, cs: &DsCallSite) -> Vec<FunctionId> {
    match cs.callee {
        CalleeRef::Direct(f) => vec![f],
        CalleeRef::Indirect(h) => graph.node_of(h).functions().collect(),
    }
}

/// First function named like the configured entry that has a body
pub(crate) fn entry_function(module: &Module, config: &DsaConfig) -> Option<FunctionId> {
    module
        .function_by_name(&config.entry_function)
        .filter(|f| f.has_body())
        .map(|f| f.id)
}

/// Pull every global variable of the globals graph into the entry graph
///
/// Only nodes are cloned, never call sites. Incompleteness of the entry
/// graph is recomputed afterwards with globals ignored.
pub(crate) fn merge_globals_into_entry(stage: &mut StageGraphs, entry: FunctionId) {
    let Some(id) = stage.graph_id(entry) else {
        return;
    };
    let StageGraphs {
        arena,
        globals_graph,
        global_ecs,
        ..
    } = stage;
    let graph = arena.graph_mut(id);
    let mut rc = ReachabilityCloner::new(
        globals_graph,
        CloneFlags::DONT_CLONE_CALL_NODES | CloneFlags::DONT_CLONE_AUX_CALL_NODES,
    );
    let roots: Vec<_> = globals_graph
        .global_entries()
        .filter(|(gv, _)| gv.is_variable())
        .map(|(_, h)| h)
        .collect();
    for h in roots {
        rc.get_cloned(graph, h, global_ecs);
    }
    graph.mask_incomplete_markers();
    graph.mark_incomplete_nodes(MarkFlags::MARK_FORMAL_ARGS | MarkFlags::IGNORE_GLOBALS, |_| true);
}

struct BottomUpClosure<'a> {
    module: &'a Module,
    config: &'a DsaConfig,
    local: &'a StageGraphs,
    stage: StageGraphs,
    /// Merged callee graph and accumulated formals per sorted target set
    ind_call_graphs: BTreeMap<Vec<FunctionId>, (HeapGraph, FunctionEntry)>,
    seen_callees: FxHashMap<GraphId, BTreeSet<FunctionId>>,
    rounds: FxHashMap<GraphId, usize>,
    stats: BottomUpStats,
}

impl<'a> BottomUpClosure<'a> {
    fn aux_callees(&self, graph: &HeapGraph) -> BTreeSet<FunctionId> {
        graph
            .aux_calls()
            .iter()
            .flat_map(|cs| resolvable_callees(self.module, graph, cs))
            .collect()
    }

    /// Make sure a merged graph exists for a multi-target call
    ///
    /// Target sets are memoized when `memoize_indirect_calls` is on. A set
    /// that includes the graph being processed, or any set with the memo
    /// off, is built for this call only and returned instead.
    fn prepare_indirect_call_graph(
        &mut self,
        current: GraphId,
        current_graph: &HeapGraph,
        targets: &[FunctionId],
    ) -> Option<(HeapGraph, FunctionEntry)> {
        let memoize = self.config.memoize_indirect_calls;
        if memoize && self.ind_call_graphs.contains_key(targets) {
            debug!(targets = targets.len(), "reusing merged indirect-call graph");
            return None;
        }

        let StageGraphs {
            arena,
            info,
            global_ecs,
            ..
        } = &mut self.stage;
        let (arena, info): (&GraphArena, &BTreeMap<FunctionId, GraphId>) = (arena, info);
        let graph_of = |f: FunctionId| callee_graph(arena, info, current, current_graph, f);

        let first = targets[0];
        let mut merged = graph_of(first).clone();
        let mut entry = merged.entry(first).cloned().unwrap_or_default();
        for &f in &targets[1..] {
            if !merged.contains_function(f) {
                clone_into(graph_of(f), &mut merged, CloneFlags::empty(), global_ecs);
            }
            let next = merged.entry(f).cloned().unwrap_or_default();
            entry = merged.merge_entries(entry, next, global_ecs);
        }
        entry.map_handles(|h| merged.resolve(h));
        merged.remove_dead_nodes(self.config.keep_unreachable_globals, None, global_ecs);

        let self_referential = targets.iter().any(|f| info.get(f) == Some(&current));
        if self_referential || !memoize {
            return Some((merged, entry));
        }
        self.ind_call_graphs.insert(targets.to_vec(), (merged, entry));
        self.stats.indirect_call_graphs += 1;
        None
    }

    fn inline_call(&mut self, g: GraphId, graph: &mut HeapGraph, cs: &DsCallSite, targets: &[FunctionId]) {
        let flags = CloneFlags::STRIP_ALLOCA_BIT | CloneFlags::DONT_CLONE_CALL_NODES;
        if let [callee] = targets {
            let callee_id = self
                .stage
                .graph_id(*callee)
                .unwrap_or_else(|| panic!("callee {} has no bottom-up graph", callee));
            if callee_id == g {
                let entry = graph.entry(*callee).cloned().unwrap_or_default();
                merge_in_graph(graph, cs, &entry, None, flags, &mut self.stage.global_ecs);
            } else {
                let StageGraphs {
                    arena, global_ecs, ..
                } = &mut self.stage;
                let callee_graph = arena.graph(callee_id);
                let entry = callee_graph.entry(*callee).cloned().unwrap_or_default();
                merge_in_graph(graph, cs, &entry, Some(callee_graph), flags, global_ecs);
            }
        } else {
            let one_off = self.prepare_indirect_call_graph(g, graph, targets);
            let (merged, entry) = match &one_off {
                Some(built) => built,
                None => &self.ind_call_graphs[targets],
            };
            merge_in_graph(graph, cs, entry, Some(merged), flags, &mut self.stage.global_ecs);
        }
        self.stats.inlined_calls += 1;
    }
}

/// Graph of a callee while `current` is out of the arena
fn callee_graph<'g>(
    arena: &'g GraphArena,
    info: &BTreeMap<FunctionId, GraphId>,
    current: GraphId,
    current_graph: &'g HeapGraph,
    f: FunctionId,
) -> &'g HeapGraph {
    match info.get(&f) {
        Some(id) if *id == current => current_graph,
        Some(id) => arena.graph(*id),
        None => panic!("callee {} has no bottom-up graph", f),
    }
}

impl SccClosure for BottomUpClosure<'_> {
    fn stage_mut(&mut self) -> &mut StageGraphs {
        &mut self.stage
    }

    fn callee_functions(&mut self, g: GraphId) -> Vec<FunctionId> {
        let callees = self.aux_callees(self.stage.graph(g));
        self.seen_callees
            .entry(g)
            .or_default()
            .extend(callees.iter().copied());
        callees.into_iter().collect()
    }

    fn graph_for(&mut self, f: FunctionId) -> GraphId {
        if let Some(id) = self.stage.graph_id(f) {
            return id;
        }
        let Some(local) = self.local.graph_of(f) else {
            return self.stage.synthesize_external_graph(self.module, f);
        };
        let mut graph = local.clone();
        clone_globals_from(
            &mut graph,
            &self.stage.globals_graph,
            CloneFlags::empty(),
            &mut self.stage.global_ecs,
        );
        self.stage.insert_graph(graph)
    }

    fn process_graph(&mut self, g: GraphId) {
        let mut graph = self.stage.arena.take(g);

        for cs in graph.take_aux_calls() {
            let cs = graph.resolved_call(&cs);
            if cs.is_noop() {
                continue;
            }

            if cs.is_indirect() {
                for f in known_targets(&graph, &cs) {
                    if self.stage.actual_callees.insert(cs.call, f) {
                        debug!(call = %cs.call, callee = %self.module.function(f).name, "new indirect callee");
                    }
                }
            }

            let targets = resolvable_callees(self.module, &graph, &cs);
            if targets.is_empty() {
                if let Some(f) = cs.direct_callee() {
                    self.stage.actual_callees.insert(cs.call, f);
                }
                graph.aux_calls_mut().push(cs);
                continue;
            }

            for f in &targets {
                self.stage.actual_callees.insert(cs.call, *f);
            }
            self.inline_call(g, &mut graph, &cs, &targets);
        }

        graph.mask_incomplete_markers();
        graph.mark_incomplete_nodes(MarkFlags::MARK_FORMAL_ARGS, |_| true);
        graph.remove_dead_nodes(
            self.config.keep_unreachable_globals,
            Some(&mut self.stage.globals_graph),
            &mut self.stage.global_ecs,
        );
        export_globals_into(&graph, &mut self.stage.globals_graph, &mut self.stage.global_ecs);

        self.stage.arena.restore(g, graph);
    }

    fn needs_revisit(&mut self, g: GraphId) -> bool {
        let now = self.aux_callees(self.stage.graph(g));
        let seen = self.seen_callees.get(&g);
        let fresh = now.iter().any(|f| !seen.is_some_and(|s| s.contains(f)));
        if !fresh {
            return false;
        }
        let rounds = self.rounds.entry(g).or_insert(1);
        if *rounds >= self.config.max_bottom_up_revisits {
            debug!(graph = %g, rounds = *rounds, "revisit limit reached");
            return false;
        }
        *rounds += 1;
        true
    }
}

/// Close every graph bottom-up, starting from the entry function
pub fn run(module: &Module, local: &LocalGraphs, config: &DsaConfig) -> Result<BottomUpGraphs> {
    let mut stage = StageGraphs::new(StageKind::BottomUp);
    stage.globals_graph = local.globals_graph().clone();
    stage.global_ecs = local.global_ecs().clone();

    let mut closure = BottomUpClosure {
        module,
        config,
        local: local.stage(),
        stage,
        ind_call_graphs: BTreeMap::new(),
        seen_callees: FxHashMap::default(),
        rounds: FxHashMap::default(),
        stats: BottomUpStats::default(),
    };
    let mut engine = SccEngine::new();

    let entry = entry_function(module, config);
    if let Some(main) = entry {
        engine.visit_function(&mut closure, main);
    }
    for f in module.defined_functions() {
        if !closure.stage.has_graph(f.id) {
            engine.visit_function(&mut closure, f.id);
        }
    }

    let BottomUpClosure {
        mut stage,
        mut stats,
        ..
    } = closure;

    stage.globals_graph.remove_trivially_dead_nodes();
    stage.globals_graph.mask_incomplete_markers();
    stage
        .globals_graph
        .mark_incomplete_nodes(MarkFlags::IGNORE_GLOBALS, |_| true);
    if let Some(main) = entry {
        merge_globals_into_entry(&mut stage, main);
    }

    let SccStats {
        collapsed_graphs,
        largest_scc,
        revisits,
    } = engine.stats;
    stats.graphs = stage.arena.len();
    stats.unresolved_calls = stage.graphs().map(|(_, g)| g.aux_calls().len()).sum();
    stats.collapsed_graphs = collapsed_graphs;
    stats.largest_scc = largest_scc;
    stats.revisits = revisits;

    info!(
        graphs = stats.graphs,
        inlined = stats.inlined_calls,
        unresolved = stats.unresolved_calls,
        largest_scc = stats.largest_scc,
        callees = stage.actual_callees.len(),
        "bottom-up closure done"
    );
    Ok(BottomUpGraphs {
        graphs: stage,
        stats,
    })
}
