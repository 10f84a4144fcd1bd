//! Stage 4: bottom-up closure over the completed call graph
//!
//! Unlike stage 2, callees come from the resolved-callee index (bottom-up
//! plus top-down discoveries) instead of from what a graph can resolve on
//! its own, so every call with a known defined target is inlined. Graphs
//! start as copies of the bottom-up graphs.

use crate::config::DsaConfig;
use crate::errors::Result;
use crate::features::bottom_up::{
    entry_function, merge_globals_into_entry, BottomUpGraphs, SccClosure, SccEngine, SccStats,
};
use crate::features::data_structures::{
    ActualCallees, DataStructureInfo, GraphId, StageGraphs, StageKind,
};
use crate::features::heap_graph::{merge_in_graph, CloneFlags, DsCallSite, HeapGraph, MarkFlags};
use crate::features::ir::{FunctionId, Module};
use crate::features::top_down::TopDownGraphs;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteStats {
    pub graphs: usize,
    pub inlined_calls: usize,
    pub pruned_aux_calls: usize,
    pub collapsed_graphs: usize,
    pub largest_scc: usize,
}

/// Result of the complete bottom-up stage
#[derive(Debug, Clone)]
pub struct CompleteGraphs {
    graphs: StageGraphs,
    pub stats: CompleteStats,
}

impl DataStructureInfo for CompleteGraphs {
    fn stage(&self) -> &StageGraphs {
        &self.graphs
    }
}

/// Defined callees of a call according to `callees`
pub(crate) fn defined_callees(module: &Module, callees: &ActualCallees, cs: &DsCallSite) -> Vec<FunctionId> {
    callees
        .callees(cs.call)
        .filter(|f| module.function(*f).has_body())
        .collect()
}

/// Whether every known target of an unresolved call has been inlined
fn is_resolved(module: &Module, callees: &ActualCallees, cs: &DsCallSite) -> bool {
    let mut targets = callees.callees(cs.call).peekable();
    targets.peek().is_some() && targets.all(|f| module.function(f).has_body())
}

struct CompleteClosure<'a> {
    module: &'a Module,
    config: &'a DsaConfig,
    bu: &'a StageGraphs,
    stage: StageGraphs,
    stats: CompleteStats,
}

impl SccClosure for CompleteClosure<'_> {
    fn stage_mut(&mut self) -> &mut StageGraphs {
        &mut self.stage
    }

    fn callee_functions(&mut self, g: GraphId) -> Vec<FunctionId> {
        let graph = self.stage.graph(g);
        let mut seen = FxHashSet::default();
        graph
            .function_calls()
            .iter()
            .flat_map(|cs| defined_callees(self.module, &self.stage.actual_callees, cs))
            .filter(|f| seen.insert(*f))
            .collect()
    }

    fn graph_for(&mut self, f: FunctionId) -> GraphId {
        if let Some(id) = self.stage.graph_id(f) {
            return id;
        }
        let bu_graph = self
            .bu
            .graph_of(f)
            .unwrap_or_else(|| panic!("function {} has no bottom-up graph", f));
        self.stage.insert_graph(bu_graph.clone())
    }

    fn process_graph(&mut self, g: GraphId) {
        let mut graph = self.stage.arena.take(g);
        let flags = CloneFlags::STRIP_ALLOCA_BIT
            | CloneFlags::DONT_CLONE_CALL_NODES
            | CloneFlags::DONT_CLONE_AUX_CALL_NODES;

        let calls: Vec<DsCallSite> = graph.function_calls().to_vec();
        let mut seen_calls = FxHashSet::default();
        for cs in calls {
            assert!(
                seen_calls.insert(cs.call),
                "call {} occurs more than once in graph {}",
                cs.call,
                g
            );
            let cs = graph.resolved_call(&cs);
            if cs.is_noop() {
                continue;
            }

            for callee in defined_callees(self.module, &self.stage.actual_callees, &cs) {
                let callee_id = self
                    .stage
                    .graph_id(callee)
                    .unwrap_or_else(|| panic!("callee {} was not closed before its caller", callee));
                if callee_id == g {
                    let entry = graph.entry(callee).cloned().unwrap_or_default();
                    merge_in_graph(&mut graph, &cs, &entry, None, flags, &mut self.stage.global_ecs);
                } else {
                    let StageGraphs {
                        arena, global_ecs, ..
                    } = &mut self.stage;
                    let callee_graph = arena.graph(callee_id);
                    let entry = callee_graph.entry(callee).cloned().unwrap_or_default();
                    merge_in_graph(&mut graph, &cs, &entry, Some(callee_graph), flags, global_ecs);
                }
                self.stats.inlined_calls += 1;
                trace!(call = %cs.call, callee = %self.module.function(callee).name, "inlined");
            }
        }

        let before = graph.aux_calls().len();
        let callees = &self.stage.actual_callees;
        let module = self.module;
        graph
            .aux_calls_mut()
            .retain(|cs| !is_resolved(module, callees, cs));
        self.stats.pruned_aux_calls += before - graph.aux_calls().len();

        graph.mask_incomplete_markers();
        graph.mark_incomplete_nodes(MarkFlags::MARK_FORMAL_ARGS, |_| true);
        graph.remove_dead_nodes(
            self.config.keep_unreachable_globals,
            Some(&mut self.stage.globals_graph),
            &mut self.stage.global_ecs,
        );
        self.stage.arena.restore(g, graph);
    }
}

/// Re-close every graph bottom-up with the completed callee index
pub fn run(
    module: &Module,
    bu: &BottomUpGraphs,
    td: &TopDownGraphs,
    config: &DsaConfig,
) -> Result<CompleteGraphs> {
    let mut stage = StageGraphs::new(StageKind::CompleteBottomUp);
    stage.globals_graph = bu.globals_graph().clone();
    stage.global_ecs = td.global_ecs().clone();
    stage.actual_callees = bu.actual_callees().clone();
    stage.actual_callees.extend(td.actual_callees());

    let mut closure = CompleteClosure {
        module,
        config,
        bu: bu.stage(),
        stage,
        stats: CompleteStats::default(),
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

    let CompleteClosure {
        mut stage,
        mut stats,
        ..
    } = closure;
    stage.globals_graph.remove_trivially_dead_nodes();
    if let Some(main) = entry {
        merge_globals_into_entry(&mut stage, main);
    }

    let SccStats {
        collapsed_graphs,
        largest_scc,
        ..
    } = engine.stats;
    stats.graphs = stage.arena.len();
    stats.collapsed_graphs = collapsed_graphs;
    stats.largest_scc = largest_scc;
    info!(
        graphs = stats.graphs,
        inlined = stats.inlined_calls,
        pruned_aux = stats.pruned_aux_calls,
        largest_scc = stats.largest_scc,
        "complete bottom-up closure done"
    );
    Ok(CompleteGraphs {
        graphs: stage,
        stats,
    })
}
