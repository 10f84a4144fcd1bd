//! End-to-end tests over the five-stage pipeline

mod common;

use common::*;
use pmgraph_dsa::features::heap_graph::{
    merge_in_graph, CalleeRef, CloneFlags, DsCallSite, MarkFlags, NodeFlags, NodeHandle, NodeId,
    Value,
};
use pmgraph_dsa::features::ir::{CallInstId, Callee, LocalId};
use pmgraph_dsa::{CallGraphView, DataStructureInfo, DsaError, DsaPipeline, StageKind};

#[test]
fn test_every_defined_function_has_a_graph_in_every_stage() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);
    for kind in StageKind::ALL {
        assert_has_graphs(out.stage(kind), &[p.main, p.f, p.g]);
    }
}

#[test]
fn test_local_graphs_hold_one_record_per_call() {
    let p = table_program();
    let out = run_pipeline(&p.module);

    for func in p.module.defined_functions() {
        let graph = out.local.graph(func.id).unwrap();
        let calls = func.calls().count();
        assert_eq!(graph.function_calls().len(), calls, "{}", func.name);
        assert!(graph.aux_calls().len() <= calls);
    }
}

#[test]
fn test_bottom_up_records_every_direct_call() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    for func in p.module.defined_functions() {
        for (call, callee) in func.calls() {
            let Callee::Direct(callee) = *callee else {
                panic!("fixture only has direct calls");
            };
            assert!(
                out.bottom_up.actual_callees().contains(call, callee),
                "{} -> {} missing",
                func.name,
                p.module.function(callee).name
            );
        }
    }
    assert_eq!(out.bottom_up.actual_callees().len(), 3);
}

#[test]
fn test_mutually_recursive_functions_share_one_graph() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    for kind in [
        StageKind::BottomUp,
        StageKind::TopDown,
        StageKind::CompleteBottomUp,
        StageKind::EquivalenceClasses,
    ] {
        assert_shares_graph(out.stage(kind), p.f, p.g);
    }
    assert!(out.bottom_up.stats.collapsed_graphs >= 1);
    assert_eq!(out.bottom_up.stats.largest_scc, 2);
}

#[test]
fn test_graph_lookup_is_stable() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);
    let first = out.complete.graph(p.f).unwrap();
    let second = out.complete.graph(p.f).unwrap();
    assert!(std::ptr::eq(first, second));
}

#[test]
fn test_global_classes_only_grow_across_stages() {
    let p = handler_program();
    let out = run_pipeline(&p.module);

    let stages: Vec<_> = StageKind::ALL.iter().map(|k| out.stage(*k)).collect();
    for pair in stages.windows(2) {
        assert!(
            pair[0].global_ecs().is_refined_by(pair[1].global_ecs()),
            "{} classes are not refined by {}",
            pair[0].stage_kind(),
            pair[1].stage_kind()
        );
    }
}

#[test]
fn test_top_down_pushes_caller_objects_into_the_scc_graph() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    let graph = out.top_down.graph(p.f).unwrap();
    assert_node_flags(graph, Value::Local(p.f, LocalId(0)), NodeFlags::HEAP);
    assert!(!out.top_down.args_remain_incomplete(p.f));
    assert!(out.top_down.args_remain_incomplete(p.main));
}

#[test]
fn test_entry_graph_sees_what_callees_store_in_globals() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    let graph = out.complete.graph(p.main).unwrap();
    let obj = graph.scalar(Value::Local(p.main, LocalId(0))).unwrap();
    let table = graph.scalar(global_value(p.table)).unwrap();
    assert_eq!(graph.link(table), Some(graph.resolve(obj)));
    assert_eq!(nodes_holding(graph, p.table), 1);
}

#[test]
fn test_indirect_targets_share_class_and_graph() {
    let p = handler_program();
    let out = run_pipeline(&p.module);
    let ec = &out.equiv_classes;

    assert!(ec.same_class(p.h1, p.h2));
    assert!(!ec.same_class(p.h1, p.main));
    assert_shares_graph(ec, p.h1, p.h2);
    assert_eq!(nodes_holding(ec.graph(p.h1).unwrap(), p.shared), 1);

    // Earlier stages keep separate graphs for the two handlers
    let cbu = &out.complete;
    assert!(!std::ptr::eq(
        cbu.graph(p.h1).unwrap(),
        cbu.graph(p.h2).unwrap()
    ));
}

#[test]
fn test_function_pointer_table_targets_reach_later_stages() {
    let p = table_program();
    let out = run_pipeline(&p.module);

    let (call, _) = p
        .module
        .function(p.worker)
        .calls()
        .next()
        .expect("worker makes one call");
    assert!(out.complete.callees_of(call).contains(&p.pop));
    assert!(out.top_down.args_remain_incomplete(p.push));
    assert!(out.top_down.args_remain_incomplete(p.pop));
}

#[test]
fn test_stages_without_synthesis_report_missing_graphs() {
    let p = table_program();
    let out = run_pipeline(&p.module);

    let err = out.complete.graph(p.ext_log).unwrap_err();
    assert!(matches!(err, DsaError::MissingGraph { .. }));
    assert!(err.to_string().contains("complete bottom-up"));
}

#[test]
fn test_bottom_up_synthesizes_external_graphs_once() {
    let p = table_program();
    let mut out = run_pipeline(&p.module);

    let first = out.bottom_up.graph_or_synthesize(&p.module, p.ext_log).unwrap() as *const _;
    let graph = out.bottom_up.graph_or_synthesize(&p.module, p.ext_log).unwrap();
    assert!(std::ptr::eq(first, graph));

    let entry = graph.entry(p.ext_log).expect("synthesized entry");
    assert_eq!(entry.args.len(), 1);
    let formal = graph.node_of(entry.args[0]);
    assert!(formal.flags.contains(NodeFlags::EXTERNAL));
    assert!(formal.is_incomplete());
}

#[test]
fn test_call_graph_view_reports_recursion() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    let cg = CallGraphView::from_stage(&p.module, &out.complete);
    assert_eq!(cg.recursive_groups(), vec![vec![p.f, p.g]]);
    assert_eq!(cg.callees(p.main), vec![p.f]);
}

#[test]
fn test_json_module_gives_the_same_result() {
    let p = handler_program();
    let direct = run_pipeline(&p.module);

    let json = p.module.to_json().unwrap();
    let (module, parsed) = DsaPipeline::default().run_json(&json).unwrap();

    let a = serde_json::to_value(direct.summaries(&p.module)).unwrap();
    let b = serde_json::to_value(parsed.summaries(&module)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_malformed_json_is_rejected() {
    let err = DsaPipeline::default().run_json("{ not json").unwrap_err();
    assert!(matches!(err, DsaError::Serialization(_)));
}

#[test]
fn test_incompleteness_only_grows_until_the_next_recompute() {
    let p = table_program();
    let out = run_pipeline(&p.module);
    let mut ecs = out.bottom_up.global_ecs().clone();

    let mut graph = out.bottom_up.graph(p.pop).unwrap().clone();
    let formal = graph.scalar(Value::Local(p.pop, LocalId(0))).unwrap();
    let item = graph.link(formal).expect("pop loads through its formal");
    let incomplete: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| graph.node(*id).is_incomplete())
        .collect();
    assert!(graph.node_of(formal).is_incomplete());
    assert!(graph.node_of(item).is_incomplete());

    // more structure inlined within the same stage
    let push_graph = out.bottom_up.graph(p.push).unwrap();
    let entry = push_graph.entry(p.push).cloned().unwrap();
    let cs = DsCallSite {
        call: CallInstId(u32::MAX),
        caller: p.pop,
        callee: CalleeRef::Direct(p.push),
        ret: None,
        args: vec![Some(formal)],
    };
    merge_in_graph(
        &mut graph,
        &cs,
        &entry,
        Some(push_graph),
        CloneFlags::STRIP_ALLOCA_BIT | CloneFlags::DONT_CLONE_CALL_NODES,
        &mut ecs,
    );

    assert!(graph.node_of(item).flags.contains(NodeFlags::HEAP));
    for id in &incomplete {
        assert!(graph.node_of(NodeHandle::at(*id)).is_incomplete(), "{:?} lost INCOMPLETE", id);
    }

    // a later stage masks and recomputes without pop's formals
    graph.mask_incomplete_markers();
    graph.mark_incomplete_nodes(MarkFlags::empty(), |_| false);
    assert!(!graph.node_of(formal).is_incomplete());
    assert!(graph.node_of(item).is_incomplete());
}
