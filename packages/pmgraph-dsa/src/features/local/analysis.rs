//! Stage 1 driver: one graph per defined function plus the globals graph

use super::builder::build_local_graph;
use crate::config::DsaConfig;
use crate::errors::Result;
use crate::features::data_structures::{DataStructureInfo, StageGraphs, StageKind};
use crate::features::heap_graph::{
    GlobalEquivalenceClasses, GlobalValue, HeapGraph, MarkFlags,
};
use crate::features::ir::{FunctionId, Module, Operand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStats {
    pub functions: usize,
    pub nodes: usize,
    pub call_sites: usize,
    pub globals_graph_nodes: usize,
}

/// Result of the local stage
#[derive(Debug, Clone)]
pub struct LocalGraphs {
    graphs: StageGraphs,
    pub stats: LocalStats,
}

impl DataStructureInfo for LocalGraphs {
    fn stage(&self) -> &StageGraphs {
        &self.graphs
    }
}

/// Build every local graph
pub fn run(module: &Module, config: &DsaConfig) -> Result<LocalGraphs> {
    module.validate()?;

    let mut stage = StageGraphs::new(StageKind::Local);
    let mut globals_graph = HeapGraph::new();
    build_initializers(module, config, &mut globals_graph, &mut stage.global_ecs);

    let defined: Vec<FunctionId> = module.defined_functions().map(|f| f.id).collect();
    let built = build_all(module, config, &defined);

    let mut stats = LocalStats::default();
    for (mut graph, ecs) in built {
        stage.global_ecs.absorb(&ecs);
        graph.mark_incomplete_nodes(MarkFlags::MARK_FORMAL_ARGS, |_| true);
        graph.remove_dead_nodes(
            config.keep_unreachable_globals,
            Some(&mut globals_graph),
            &mut stage.global_ecs,
        );

        stats.functions += 1;
        stats.nodes += graph.node_count();
        stats.call_sites += graph.function_calls().len();
        stage.insert_graph(graph);
    }

    globals_graph.remove_trivially_dead_nodes();
    globals_graph.mark_incomplete_nodes(MarkFlags::MARK_FORMAL_ARGS, |_| true);
    stats.globals_graph_nodes = globals_graph.node_count();
    stage.globals_graph = globals_graph;

    info!(
        functions = stats.functions,
        nodes = stats.nodes,
        call_sites = stats.call_sites,
        globals = stats.globals_graph_nodes,
        "local graphs built"
    );
    Ok(LocalGraphs {
        graphs: stage,
        stats,
    })
}

#[cfg(feature = "parallel")]
fn build_all(
    module: &Module,
    config: &DsaConfig,
    defined: &[FunctionId],
) -> Vec<(HeapGraph, GlobalEquivalenceClasses)> {
    if config.parallel_local {
        debug!(functions = defined.len(), "building local graphs in parallel");
        return defined
            .par_iter()
            .map(|f| build_local_graph(module, config, *f))
            .collect();
    }
    defined
        .iter()
        .map(|f| build_local_graph(module, config, *f))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn build_all(
    module: &Module,
    config: &DsaConfig,
    defined: &[FunctionId],
) -> Vec<(HeapGraph, GlobalEquivalenceClasses)> {
    defined
        .iter()
        .map(|f| build_local_graph(module, config, *f))
        .collect()
}

/// Seed the globals graph with every global and its static initializer
fn build_initializers(
    module: &Module,
    config: &DsaConfig,
    gg: &mut HeapGraph,
    ecs: &mut GlobalEquivalenceClasses,
) {
    for global in &module.globals {
        let node = gg.global_node(GlobalValue::Variable(global.id), ecs);
        let Some(init) = &global.initializer else {
            continue;
        };
        for (field, op) in init {
            let target = match op {
                Operand::Global(g) => gg.global_node(GlobalValue::Variable(*g), ecs),
                Operand::Function(f) => gg.global_node(GlobalValue::Function(*f), ecs),
                Operand::Local(_) | Operand::Null => continue,
            };
            let slot = if config.field_sensitive {
                node.field(*field)
            } else {
                node
            };
            gg.add_link(slot, target, ecs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::heap_graph::{NodeFlags, Value};
    use crate::features::ir::ModuleBuilder;

    #[test]
    fn test_every_defined_function_gets_a_graph() {
        let mut mb = ModuleBuilder::new("m");
        let ext = mb.declare("ext", 1);
        let leaf = mb.function("leaf", 1, |b| {
            let p = b.param(0);
            b.ret(p);
        });
        let main = mb.function("main", 0, |b| {
            let x = b.alloca();
            b.call_void(leaf, vec![x]);
            b.call_void(ext, vec![x]);
            b.ret_void();
        });
        let module = mb.build().unwrap();

        let local = run(&module, &DsaConfig::default().parallel_local(false)).unwrap();
        assert!(local.has_graph(leaf));
        assert!(local.has_graph(main));
        assert!(!local.has_graph(ext));
        assert_eq!(local.graph(main).unwrap().function_calls().len(), 2);
        assert_eq!(local.stats.call_sites, 2);
    }

    #[test]
    fn test_initializers_link_function_tables() {
        let mut mb = ModuleBuilder::new("m");
        let h = mb.function("handler", 0, |b| b.ret_void());
        let table = mb.global_with_init("table", Some(vec![(0, Operand::Function(h))]));
        mb.function("main", 0, |b| b.ret_void());
        let module = mb.build().unwrap();

        let local = run(&module, &DsaConfig::default()).unwrap();
        let gg = local.globals_graph();
        let t = gg.scalar(Value::Global(GlobalValue::Variable(table))).unwrap();
        let target = gg.link(t).unwrap();
        assert_eq!(gg.node_of(target).functions().collect::<Vec<_>>(), vec![h]);
        assert!(gg.node_of(t).flags.contains(NodeFlags::INCOMPLETE));
    }

    #[test]
    fn test_formals_are_incomplete_locally() {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.function("f", 1, |b| {
            let p = b.param(0);
            let v = b.load(p);
            b.ret(v);
        });
        let module = mb.build().unwrap();
        let local = run(&module, &DsaConfig::default()).unwrap();
        let graph = local.graph(f).unwrap();
        let entry = graph.entry(f).unwrap();
        assert!(entry.handles().all(|h| graph.node_of(h).is_incomplete()));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_and_sequential_agree() {
        let mut mb = ModuleBuilder::new("m");
        let g = mb.global("shared");
        for i in 0..8 {
            mb.function(format!("f{}", i), 0, |b| {
                let obj = b.malloc();
                b.store(obj, Operand::Global(g));
                b.ret_void();
            });
        }
        let module = mb.build().unwrap();

        let seq = run(&module, &DsaConfig::default().parallel_local(false)).unwrap();
        let par = run(&module, &DsaConfig::default().parallel_local(true)).unwrap();
        assert_eq!(seq.print(&module), par.print(&module));
    }
}
