//! Stage 5: one graph per class of interchangeable call targets
//!
//! Functions that may be called from the same call site are put in one
//! class, together with every function sharing a complete bottom-up graph
//! with them. Each class gets a single graph (the members' graphs cloned
//! together, formals and return values unified), and the bottom-up closure
//! runs once more so that callers inline the class graph.

use crate::config::DsaConfig;
use crate::errors::Result;
use crate::features::bottom_up::{
    entry_function, merge_globals_into_entry, SccClosure, SccEngine, SccStats,
};
use crate::features::complete_bu::{defined_callees, CompleteGraphs};
use crate::features::data_structures::{DataStructureInfo, GraphId, StageGraphs, StageKind};
use crate::features::heap_graph::{
    clone_into, export_globals_into, merge_in_graph, CloneFlags, DsCallSite, GlobalValue,
    MarkFlags, ReachabilityCloner, Value,
};
use crate::features::ir::{CallInstId, FunctionId, Module, Operand};
use crate::shared::KeyedUnionFind;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivClassStats {
    pub graphs: usize,
    /// Classes with more than one member
    pub merged_classes: usize,
    pub merged_functions: usize,
    pub inlined_calls: usize,
    pub collapsed_graphs: usize,
    pub largest_scc: usize,
    pub rematerialized_globals: usize,
}

/// Result of the equivalence-class stage
#[derive(Debug, Clone)]
pub struct EquivClassGraphs {
    graphs: StageGraphs,
    function_ecs: KeyedUnionFind<FunctionId>,
    one_called_function: BTreeMap<CallInstId, FunctionId>,
    pub stats: EquivClassStats,
}

impl DataStructureInfo for EquivClassGraphs {
    fn stage(&self) -> &StageGraphs {
        &self.graphs
    }
}

impl EquivClassGraphs {
    pub fn function_ecs(&self) -> &KeyedUnionFind<FunctionId> {
        &self.function_ecs
    }

    /// Members of `f`'s class, sorted; `[f]` for a singleton
    pub fn class_of(&self, f: FunctionId) -> Vec<FunctionId> {
        self.function_ecs.members(f)
    }

    pub fn same_class(&self, a: FunctionId, b: FunctionId) -> bool {
        self.function_ecs.same_class(a, b)
    }

    /// Any one defined target of a call; every target shares its graph
    pub fn some_callee_for_call_site(&self, call: CallInstId) -> Option<FunctionId> {
        self.one_called_function.get(&call).copied()
    }
}

/// Partition defined call targets into classes
///
/// Returns the classes and one representative callee per call.
fn build_function_classes(
    module: &Module,
    cbu: &CompleteGraphs,
) -> (KeyedUnionFind<FunctionId>, BTreeMap<CallInstId, FunctionId>) {
    let mut ecs = KeyedUnionFind::new();
    let mut first_callee: BTreeMap<CallInstId, FunctionId> = BTreeMap::new();

    for (call, f) in cbu.actual_callees().iter() {
        if !module.function(f).has_body() {
            continue;
        }
        let first = *first_callee.entry(call).or_insert(f);
        if first == f {
            ecs.insert(f);
        } else {
            ecs.union(first, f);
        }

        if let Ok(graph) = cbu.graph(f) {
            for other in graph.represented_functions() {
                ecs.union(first, other);
            }
        }
    }
    (ecs, first_callee)
}

struct EquivClassClosure<'a> {
    module: &'a Module,
    config: &'a DsaConfig,
    cbu: &'a StageGraphs,
    stage: StageGraphs,
    stats: EquivClassStats,
}

impl EquivClassClosure<'_> {
    /// Fold the graphs of every class member into the leader's graph
    fn merge_class(&mut self, members: &[FunctionId]) {
        let leader = members[0];
        let merged_id = self.graph_for(leader);
        let mut merged = self.stage.arena.take(merged_id);
        let ecs = &mut self.stage.global_ecs;

        let mut absorbed: FxHashSet<GraphId> = self.cbu.graph_id(leader).into_iter().collect();
        let mut entry = merged.entry(leader).cloned().unwrap_or_default();
        for &f in &members[1..] {
            let cbu_id = self
                .cbu
                .graph_id(f)
                .unwrap_or_else(|| panic!("class member {} has no complete graph", f));
            if absorbed.insert(cbu_id) {
                let member_graph = self.cbu.graph(cbu_id);
                for g in member_graph.represented_functions() {
                    let previous = self.stage.info.insert(g, merged_id);
                    assert!(
                        previous.is_none() || previous == Some(merged_id),
                        "function {} already has an equivalence-class graph",
                        g
                    );
                }
                clone_into(member_graph, &mut merged, CloneFlags::empty(), ecs);
            }
            let next = merged.entry(f).cloned().unwrap_or_default();
            entry = merged.merge_entries(entry, next, ecs);
        }

        self.stage.arena.restore(merged_id, merged);
        self.stats.merged_classes += 1;
        self.stats.merged_functions += members.len();
        debug!(leader = %self.module.function(leader).name, members = members.len(), "merged class graph");
    }

    /// Bring back globals used by instructions but dropped as dead
    fn rematerialize_globals(&mut self) {
        let StageGraphs {
            arena,
            info,
            globals_graph,
            global_ecs,
            ..
        } = &mut self.stage;

        let mut used: BTreeMap<GraphId, Vec<GlobalValue>> = BTreeMap::new();
        for func in self.module.defined_functions() {
            let Some(&g) = info.get(&func.id) else { continue };
            let globals = used.entry(g).or_default();
            for inst in func.instructions() {
                for op in inst.operands() {
                    match op {
                        Operand::Global(gv) => globals.push(GlobalValue::Variable(gv)),
                        Operand::Function(f) => globals.push(GlobalValue::Function(f)),
                        Operand::Local(_) | Operand::Null => {}
                    }
                }
            }
        }

        for (g, globals) in used {
            let graph = arena.graph_mut(g);
            let mut rc = ReachabilityCloner::new(globals_graph, CloneFlags::empty());
            for gv in globals {
                let v = Value::Global(gv);
                if graph.scalar(v).is_some() {
                    continue;
                }
                let Some(h) = globals_graph.scalar(v) else { continue };
                rc.get_cloned(graph, h, global_ecs);
                self.stats.rematerialized_globals += 1;
                trace!(graph = %g, global = %gv, "rematerialized global");
            }
        }
    }
}

impl SccClosure for EquivClassClosure<'_> {
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
        let cbu_graph = self
            .cbu
            .graph_of(f)
            .unwrap_or_else(|| panic!("function {} has no complete graph", f));
        self.stage.insert_graph(cbu_graph.clone())
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

            // Every target shares one class graph, so the first is enough.
            let Some(&callee) = defined_callees(self.module, &self.stage.actual_callees, &cs).first()
            else {
                continue;
            };
            let callee_id = self
                .stage
                .graph_id(callee)
                .unwrap_or_else(|| panic!("callee {} was not closed before its caller", callee));
            if callee_id == g {
                continue;
            }

            let StageGraphs {
                arena, global_ecs, ..
            } = &mut self.stage;
            let callee_graph = arena.graph(callee_id);
            let entry = callee_graph.entry(callee).cloned().unwrap_or_default();
            merge_in_graph(&mut graph, &cs, &entry, Some(callee_graph), flags, global_ecs);
            self.stats.inlined_calls += 1;
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
}

/// Merge class graphs and close them bottom-up
pub fn run(module: &Module, cbu: &CompleteGraphs, config: &DsaConfig) -> Result<EquivClassGraphs> {
    let mut stage = StageGraphs::new(StageKind::EquivalenceClasses);
    stage.globals_graph = cbu.globals_graph().clone();
    stage.global_ecs = cbu.global_ecs().clone();
    stage.actual_callees = cbu.actual_callees().clone();

    let (function_ecs, one_called_function) = build_function_classes(module, cbu);

    let mut closure = EquivClassClosure {
        module,
        config,
        cbu: cbu.stage(),
        stage,
        stats: EquivClassStats::default(),
    };
    for members in function_ecs.classes().into_values() {
        if members.len() > 1 {
            closure.merge_class(&members);
        }
    }

    let mut engine = SccEngine::new();
    let entry = entry_function(module, config);
    if let Some(main) = entry {
        engine.visit_function(&mut closure, main);
    }
    for f in module.defined_functions() {
        engine.visit_function(&mut closure, f.id);
    }

    let gg = &mut closure.stage.globals_graph;
    gg.remove_trivially_dead_nodes();
    gg.mask_incomplete_markers();
    gg.mark_incomplete_nodes(MarkFlags::IGNORE_GLOBALS, |_| true);
    if let Some(main) = entry {
        merge_globals_into_entry(&mut closure.stage, main);
    }
    closure.rematerialize_globals();

    let EquivClassClosure {
        stage, mut stats, ..
    } = closure;
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
        classes = stats.merged_classes,
        functions = stats.merged_functions,
        inlined = stats.inlined_calls,
        rematerialized = stats.rematerialized_globals,
        "equivalence-class graphs built"
    );
    Ok(EquivClassGraphs {
        graphs: stage,
        function_ecs,
        one_called_function,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::heap_graph::NodeFlags;
    use crate::features::ir::{LocalId, ModuleBuilder};

    fn ec(module: &Module) -> EquivClassGraphs {
        let config = DsaConfig::default();
        let local = crate::features::local::run(module, &config).unwrap();
        let bu = crate::features::bottom_up::run(module, &local, &config).unwrap();
        let td = crate::features::top_down::run(module, &bu, &config).unwrap();
        let cbu = crate::features::complete_bu::run(module, &bu, &td, &config).unwrap();
        run(module, &cbu, &config).unwrap()
    }

    /// `main` calls either `h1` or `h2` through one pointer; both touch `shared`
    fn two_handlers() -> (Module, FunctionId, FunctionId, GlobalValue) {
        let mut mb = ModuleBuilder::new("m");
        let shared = mb.global("shared");
        let h1 = mb.function("h1", 1, |b| {
            let p = b.param(0);
            b.store(p, Operand::Global(shared));
            b.ret_void();
        });
        let h2 = mb.function("h2", 1, |b| {
            let v = b.load(Operand::Global(shared));
            let p = b.param(0);
            b.store(v, p);
            b.ret_void();
        });
        mb.function("main", 0, |b| {
            let slot = b.alloca();
            b.store(Operand::Function(h1), slot);
            b.store(Operand::Function(h2), slot);
            let fp = b.load(slot);
            let obj = b.malloc();
            b.call_indirect_void(fp, vec![obj]);
            b.ret_void();
        });
        (mb.build().unwrap(), h1, h2, GlobalValue::Variable(shared))
    }

    #[test]
    fn test_targets_of_one_call_share_a_class_and_graph() {
        let (module, h1, h2, shared) = two_handlers();
        let result = ec(&module);

        assert!(result.same_class(h1, h2));
        assert_eq!(result.class_of(h1), vec![h1, h2]);
        assert_eq!(result.stage().graph_id(h1), result.stage().graph_id(h2));

        let graph = result.graph(h1).unwrap();
        let global = graph.scalar(Value::Global(shared)).unwrap();
        let count = graph
            .node_ids()
            .filter(|id| graph.node(*id).globals.contains(&shared))
            .count();
        assert_eq!(count, 1);
        assert!(graph.node_of(global).globals.contains(&shared));
    }

    #[test]
    fn test_class_members_share_formals() {
        let (module, h1, h2, _) = two_handlers();
        let result = ec(&module);

        let graph = result.graph(h1).unwrap();
        let a = graph.scalar(Value::Local(h1, LocalId(0))).unwrap();
        let b = graph.scalar(Value::Local(h2, LocalId(0))).unwrap();
        assert_eq!(graph.resolve(a), graph.resolve(b));
    }

    #[test]
    fn test_some_callee_is_a_class_member() {
        let (module, h1, h2, _) = two_handlers();
        let result = ec(&module);

        let call = module
            .defined_functions()
            .flat_map(|f| f.calls())
            .map(|(call, _)| call)
            .next()
            .unwrap();
        let callee = result.some_callee_for_call_site(call).unwrap();
        assert!(callee == h1 || callee == h2);
    }

    #[test]
    fn test_caller_inlines_the_class_graph() {
        let (module, _, _, shared) = two_handlers();
        let result = ec(&module);

        let main = module.function_by_name("main").unwrap().id;
        let graph = result.graph(main).unwrap();
        let obj = graph.scalar(Value::Local(main, LocalId(2))).unwrap();
        let global = graph.scalar(Value::Global(shared)).unwrap();
        assert_eq!(graph.link(global), Some(graph.resolve(obj)));
        assert!(graph.node_of(obj).flags.contains(NodeFlags::HEAP));
    }

    #[test]
    fn test_direct_only_program_has_singleton_classes() {
        let mut mb = ModuleBuilder::new("m");
        let leaf = mb.function("leaf", 0, |b| b.ret_void());
        let main = mb.function("main", 0, |b| {
            let x = b.alloca();
            b.call_void(leaf, vec![x]);
            b.ret_void();
        });
        let module = mb.build().unwrap();
        let result = ec(&module);

        assert!(!result.same_class(leaf, main));
        assert_eq!(result.stats.merged_classes, 0);
        assert_eq!(result.class_of(leaf), vec![leaf]);
    }
}
