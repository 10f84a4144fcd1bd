//! Call-site inlining in both directions
//!
//! Bottom-up: a callee graph is cloned into the caller and its formals are
//! unified with the call site's actuals. Top-down: the caller's actuals are
//! cloned into the callee and unified with its formals.

use super::cloner::ReachabilityCloner;
use super::graph::HeapGraph;
use crate::features::heap_graph::domain::{
    CloneFlags, DsCallSite, FunctionEntry, GlobalEquivalenceClasses, NodeHandle,
};
use crate::features::ir::FunctionId;
use tracing::trace;

/// Unify a call site's actuals with a formal-side entry (same graph)
///
/// Actuals beyond the formal count spill into the vararg node when the
/// entry has one.
pub fn unify_call_with_entry(
    graph: &mut HeapGraph,
    cs: &DsCallSite,
    entry: &FunctionEntry,
    ecs: &mut GlobalEquivalenceClasses,
) {
    if let (Some(ret), Some(formal_ret)) = (cs.ret, entry.ret) {
        graph.merge(ret, formal_ret, ecs);
    }
    for (i, actual) in cs.args.iter().enumerate() {
        let Some(actual) = *actual else { continue };
        match entry.args.get(i) {
            Some(formal) => graph.merge(actual, *formal, ecs),
            None => {
                if let Some(va) = entry.vararg {
                    graph.merge(actual, va, ecs);
                }
            }
        }
    }
}

/// Inline a callee into the graph holding `cs`
///
/// `entry` is the callee's formal side in `callee_graph`'s handle space, or
/// in `dst`'s own space when `callee_graph` is `None` (recursion inside a
/// collapsed graph). Callee globals also present in `dst` are unified, and
/// callee globals pointing at cloned structure are brought along.
pub fn merge_in_graph(
    dst: &mut HeapGraph,
    cs: &DsCallSite,
    entry: &FunctionEntry,
    callee_graph: Option<&HeapGraph>,
    flags: CloneFlags,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let Some(src) = callee_graph else {
        unify_call_with_entry(dst, cs, entry, ecs);
        return;
    };

    let mut rc = ReachabilityCloner::new(src, flags);
    let mapped = rc.clone_entry(dst, entry, ecs);
    unify_call_with_entry(dst, cs, &mapped, ecs);
    rc.merge_common_globals(dst, ecs);
    rc.clone_reaching_globals(dst, ecs);

    if !flags.contains(CloneFlags::DONT_CLONE_CALL_NODES) {
        for callee_cs in src.function_calls() {
            let cloned = rc.clone_call_site(dst, callee_cs, ecs);
            dst.function_calls_mut().push(cloned);
        }
    }

    if !flags.contains(CloneFlags::DONT_CLONE_AUX_CALL_NODES) {
        for callee_cs in src.aux_calls() {
            let cloned = rc.clone_call_site(dst, callee_cs, ecs);
            dst.aux_calls_mut().push(cloned);
        }
    }

    trace!(call = %cs.call, nodes = dst.node_count(), "inlined callee graph");
}

/// Push caller-side structure of one call site into the callee graph
pub fn merge_caller_site(
    callee_graph: &mut HeapGraph,
    callee: FunctionId,
    caller_graph: &HeapGraph,
    cs: &DsCallSite,
    flags: CloneFlags,
    ecs: &mut GlobalEquivalenceClasses,
) {
    merge_caller_sites(
        callee_graph,
        caller_graph,
        std::slice::from_ref(&(callee, cs.clone())),
        flags,
        ecs,
    );
}

/// Push several call sites of one caller graph into the callee graph
///
/// All sites share one cloner, so a caller object passed at two sites
/// lands on a single callee node.
pub fn merge_caller_sites(
    callee_graph: &mut HeapGraph,
    caller_graph: &HeapGraph,
    sites: &[(FunctionId, DsCallSite)],
    flags: CloneFlags,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let mut rc = ReachabilityCloner::new(caller_graph, flags);
    for (callee, cs) in sites {
        let Some(entry) = callee_graph.entry(*callee).cloned() else {
            continue;
        };
        if let (Some(formal_ret), Some(ret)) = (entry.ret, cs.ret) {
            rc.merge_with(callee_graph, formal_ret, ret, ecs);
        }
        for (i, actual) in cs.args.iter().enumerate() {
            let Some(actual) = *actual else { continue };
            let formal = entry.args.get(i).copied().or(entry.vararg);
            if let Some(formal) = formal {
                rc.merge_with(callee_graph, formal, actual, ecs);
            }
        }
    }
    rc.merge_common_globals(callee_graph, ecs);
    rc.clone_reaching_globals(callee_graph, ecs);
}

/// Accumulate a call site from `src` into a call-site record of `dst`
///
/// `acc` grows to cover every argument position seen so far; positions
/// already present are unified.
pub fn accumulate_call_site(
    dst: &mut HeapGraph,
    acc: &mut DsCallSite,
    src: &HeapGraph,
    cs: &DsCallSite,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let mut rc = ReachabilityCloner::new(src, CloneFlags::empty());
    if let Some(ret) = cs.ret {
        let cloned = rc.get_cloned(dst, ret, ecs);
        acc.ret = Some(merge_slot(dst, acc.ret, cloned, ecs));
    }
    for (i, actual) in cs.args.iter().enumerate() {
        let Some(actual) = *actual else {
            if acc.args.len() <= i {
                acc.args.push(None);
            }
            continue;
        };
        let cloned = rc.get_cloned(dst, actual, ecs);
        if acc.args.len() <= i {
            acc.args.push(Some(cloned));
        } else {
            acc.args[i] = Some(merge_slot(dst, acc.args[i], cloned, ecs));
        }
    }
    rc.merge_common_globals(dst, ecs);
}

fn merge_slot(
    graph: &mut HeapGraph,
    slot: Option<NodeHandle>,
    h: NodeHandle,
    ecs: &mut GlobalEquivalenceClasses,
) -> NodeHandle {
    match slot {
        Some(existing) => {
            graph.merge(existing, h, ecs);
            graph.resolve(existing)
        }
        None => h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::heap_graph::domain::{CalleeRef, GlobalValue, NodeFlags, Value};
    use crate::features::ir::{CallInstId, GlobalId, LocalId};

    fn call(args: Vec<Option<NodeHandle>>, ret: Option<NodeHandle>) -> DsCallSite {
        DsCallSite {
            call: CallInstId(0),
            caller: FunctionId(0),
            callee: CalleeRef::Direct(FunctionId(1)),
            ret,
            args,
        }
    }

    #[test]
    fn test_merge_in_graph_binds_formals_to_actuals() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let callee = FunctionId(1);

        // callee: stores a heap object into *arg0
        let mut src = HeapGraph::new();
        let formal = src.scalar_or_create(Value::Local(callee, LocalId(0)));
        let heap = NodeHandle::at(src.add_node(NodeFlags::HEAP));
        src.add_link(formal, heap, &mut ecs);
        let entry = FunctionEntry {
            args: vec![formal],
            ..Default::default()
        };

        let mut dst = HeapGraph::new();
        let actual = NodeHandle::at(dst.add_node(NodeFlags::ALLOCA));
        let cs = call(vec![Some(actual)], None);
        merge_in_graph(
            &mut dst,
            &cs,
            &entry,
            Some(&src),
            CloneFlags::STRIP_ALLOCA_BIT,
            &mut ecs,
        );

        let pointee = dst.link(actual).expect("callee store is visible");
        assert!(dst.node_of(pointee).flags.contains(NodeFlags::HEAP));
        assert!(dst.node_of(actual).flags.contains(NodeFlags::ALLOCA));
    }

    #[test]
    fn test_extra_actuals_spill_into_vararg() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let mut g = HeapGraph::new();
        let va = NodeHandle::at(g.add_node(NodeFlags::empty()));
        let a = NodeHandle::at(g.add_node(NodeFlags::HEAP));
        let b = NodeHandle::at(g.add_node(NodeFlags::ALLOCA));
        let entry = FunctionEntry {
            args: vec![],
            ret: None,
            vararg: Some(va),
        };
        unify_call_with_entry(&mut g, &call(vec![Some(a), Some(b)], None), &entry, &mut ecs);
        assert_eq!(g.resolve(a), g.resolve(va));
        assert_eq!(g.resolve(b), g.resolve(va));
    }

    #[test]
    fn test_accumulate_grows_argument_list() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let mut src = HeapGraph::new();
        let a = NodeHandle::at(src.add_node(NodeFlags::HEAP));
        let b = NodeHandle::at(src.add_node(NodeFlags::ALLOCA));

        let mut memo = HeapGraph::new();
        let mut acc = call(vec![], None);
        accumulate_call_site(&mut memo, &mut acc, &src, &call(vec![Some(a)], None), &mut ecs);
        accumulate_call_site(
            &mut memo,
            &mut acc,
            &src,
            &call(vec![Some(b), Some(b)], None),
            &mut ecs,
        );

        assert_eq!(acc.args.len(), 2);
        let first = memo.node_of(acc.args[0].unwrap()).flags;
        assert!(first.contains(NodeFlags::HEAP | NodeFlags::ALLOCA));
    }

    #[test]
    fn test_caller_sites_share_one_cloner() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let callee = FunctionId(1);

        let mut caller = HeapGraph::new();
        let obj = NodeHandle::at(caller.add_node(NodeFlags::HEAP));

        let mut g = HeapGraph::new();
        let p0 = NodeHandle::at(g.add_node(NodeFlags::empty()));
        let p1 = NodeHandle::at(g.add_node(NodeFlags::empty()));
        g.set_entry(
            callee,
            FunctionEntry {
                args: vec![p0, p1],
                ..Default::default()
            },
            &mut ecs,
        );

        let sites = vec![
            (callee, call(vec![Some(obj), None], None)),
            (callee, call(vec![None, Some(obj)], None)),
        ];
        merge_caller_sites(&mut g, &caller, &sites, CloneFlags::empty(), &mut ecs);

        assert_eq!(g.resolve(p0), g.resolve(p1));
        assert!(g.node_of(p0).flags.contains(NodeFlags::HEAP));
    }

    #[test]
    fn test_single_caller_site_brings_caller_structure() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let callee = FunctionId(1);

        let mut caller = HeapGraph::new();
        let obj = NodeHandle::at(caller.add_node(NodeFlags::HEAP));
        let field = NodeHandle::at(caller.add_node(NodeFlags::ALLOCA));
        caller.add_link(obj, field, &mut ecs);

        let mut g = HeapGraph::new();
        let p0 = NodeHandle::at(g.add_node(NodeFlags::empty()));
        let p1 = NodeHandle::at(g.add_node(NodeFlags::empty()));
        g.set_entry(
            callee,
            FunctionEntry {
                args: vec![p0, p1],
                ..Default::default()
            },
            &mut ecs,
        );

        let flags = CloneFlags::DONT_CLONE_CALL_NODES | CloneFlags::DONT_CLONE_AUX_CALL_NODES;
        merge_caller_site(&mut g, callee, &caller, &call(vec![Some(obj), None], None), flags, &mut ecs);
        merge_caller_site(&mut g, callee, &caller, &call(vec![None, Some(obj)], None), flags, &mut ecs);

        assert!(g.node_of(p0).flags.contains(NodeFlags::HEAP));
        let pointee = g.link(p0).expect("caller link is cloned");
        assert!(g.node_of(pointee).flags.contains(NodeFlags::ALLOCA));
        // separate calls clone the caller object separately
        assert_ne!(g.resolve(p0), g.resolve(p1));
        assert!(g.function_calls().is_empty());
    }

    #[test]
    fn test_callee_global_holding_a_formal_is_inlined() {
        let mut ecs = GlobalEquivalenceClasses::new();
        let table = GlobalValue::Variable(GlobalId(0));

        let mut callee = HeapGraph::new();
        let p = NodeHandle::at(callee.add_node(NodeFlags::empty()));
        let g = callee.global_node(table, &mut ecs);
        callee.add_link(g, p, &mut ecs);
        let entry = FunctionEntry {
            args: vec![p],
            ..Default::default()
        };

        let mut caller = HeapGraph::new();
        let obj = NodeHandle::at(caller.add_node(NodeFlags::HEAP));
        let cs = call(vec![Some(obj)], None);
        merge_in_graph(&mut caller, &cs, &entry, Some(&callee), CloneFlags::empty(), &mut ecs);

        let t = caller.scalar(Value::Global(table)).unwrap();
        assert_eq!(caller.link(t), Some(caller.resolve(obj)));
    }
}
