//! Reachability-limited cloning between graphs
//!
//! A [`ReachabilityCloner`] copies only what is reachable from the handles it
//! is asked about, memoizing the source→destination node mapping so shared
//! structure is cloned once. A cloned node that represents a global is
//! unified with the destination's node for the same global.

use super::graph::HeapGraph;
use crate::features::heap_graph::domain::{
    CloneFlags, DsCallSite, FunctionEntry, GlobalEquivalenceClasses, NodeFlags, NodeHandle,
    NodeId, Value,
};
use rustc_hash::FxHashMap;

pub struct ReachabilityCloner<'a> {
    src: &'a HeapGraph,
    flags: CloneFlags,
    strip: NodeFlags,
    map: FxHashMap<NodeId, NodeHandle>,
    pending: Vec<NodeId>,
}

impl<'a> ReachabilityCloner<'a> {
    pub fn new(src: &'a HeapGraph, flags: CloneFlags) -> Self {
        Self {
            src,
            flags,
            strip: flags.stripped_node_flags(),
            map: FxHashMap::default(),
            pending: Vec::new(),
        }
    }

    pub fn flags(&self) -> CloneFlags {
        self.flags
    }

    /// Destination handle for a source handle, cloning what it reaches
    pub fn get_cloned(
        &mut self,
        dst: &mut HeapGraph,
        h: NodeHandle,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> NodeHandle {
        let h = self.src.resolve(h);
        let base = self.clone_node(dst, h.node, ecs);
        self.drain(dst, ecs);
        dst.resolve(base.field(h.offset))
    }

    /// Unify a destination handle with (the clone of) a source handle
    pub fn merge_with(
        &mut self,
        dst: &mut HeapGraph,
        dst_h: NodeHandle,
        src_h: NodeHandle,
        ecs: &mut GlobalEquivalenceClasses,
    ) {
        let cloned = self.get_cloned(dst, src_h, ecs);
        dst.merge(dst_h, cloned, ecs);
    }

    /// Clone a source call site into destination handles
    pub fn clone_call_site(
        &mut self,
        dst: &mut HeapGraph,
        cs: &DsCallSite,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> DsCallSite {
        let mut cloned = cs.clone();
        cloned.map_handles(|h| self.get_cloned(dst, h, ecs));
        cloned
    }

    /// Clone a formal-side entry into destination handles
    pub fn clone_entry(
        &mut self,
        dst: &mut HeapGraph,
        entry: &FunctionEntry,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> FunctionEntry {
        let mut cloned = entry.clone();
        cloned.map_handles(|h| self.get_cloned(dst, h, ecs));
        cloned
    }

    /// Unify the source's global nodes with the destination's nodes for the
    /// same globals; globals absent from the destination are skipped
    pub fn merge_common_globals(&mut self, dst: &mut HeapGraph, ecs: &mut GlobalEquivalenceClasses) {
        let common: Vec<(Value, NodeHandle, NodeHandle)> = self
            .src
            .global_entries()
            .filter_map(|(gv, src_h)| {
                let v = Value::Global(gv);
                dst.scalar(v).map(|dst_h| (v, dst_h, src_h))
            })
            .collect();
        for (_, dst_h, src_h) in common {
            self.merge_with(dst, dst_h, src_h, ecs);
        }
    }

    /// Clone the source globals that point at already-cloned structure
    ///
    /// A global qualifies when some path from its node reaches a cloned node
    /// without passing through another global. Decided for every global
    /// before any of them is cloned.
    pub fn clone_reaching_globals(&mut self, dst: &mut HeapGraph, ecs: &mut GlobalEquivalenceClasses) {
        let mut memo: FxHashMap<NodeId, bool> = FxHashMap::default();
        let mut to_copy = Vec::new();
        for (_, h) in self.src.global_entries() {
            let h = self.src.resolve(h);
            if self.map.contains_key(&h.node) {
                continue;
            }
            let reaches = self
                .src
                .links_of(h.node)
                .into_iter()
                .any(|(_, target)| self.reaches_cloned(target.node, &mut memo));
            if reaches {
                to_copy.push(h);
            }
        }
        for h in to_copy {
            self.get_cloned(dst, h, ecs);
        }
    }

    fn reaches_cloned(&self, n: NodeId, memo: &mut FxHashMap<NodeId, bool>) -> bool {
        let n = self.src.resolve(NodeHandle::at(n)).node;
        if let Some(&known) = memo.get(&n) {
            return known;
        }
        if self.map.contains_key(&n) {
            memo.insert(n, true);
            return true;
        }
        if !self.src.node(n).globals.is_empty() {
            memo.insert(n, false);
            return false;
        }
        // in progress: cycles do not count as reaching
        memo.insert(n, false);
        let reaches = self
            .src
            .links_of(n)
            .into_iter()
            .any(|(_, target)| self.reaches_cloned(target.node, memo));
        memo.insert(n, reaches);
        reaches
    }

    fn clone_node(
        &mut self,
        dst: &mut HeapGraph,
        sn: NodeId,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> NodeHandle {
        if let Some(&mapped) = self.map.get(&sn) {
            return mapped;
        }

        let src_node = self.src.node(sn);
        let id = dst.add_node(src_node.flags.difference(self.strip));
        dst.node_mut(id).globals = src_node.globals.clone();
        let mapped = NodeHandle::at(id);
        self.map.insert(sn, mapped);
        self.pending.push(sn);

        for gv in &src_node.globals {
            ecs.insert(*gv);
            dst.bind_scalar(Value::Global(*gv), mapped, ecs);
        }
        mapped
    }

    fn drain(&mut self, dst: &mut HeapGraph, ecs: &mut GlobalEquivalenceClasses) {
        while let Some(sn) = self.pending.pop() {
            let base = self.map[&sn];
            for (offset, target) in self.src.links_of(sn) {
                let cloned = self.clone_node(dst, target.node, ecs).field(target.offset);
                dst.add_link(base.field(offset), cloned, ecs);
            }
        }
    }
}

/// Copy an entire graph into another one
///
/// Every node, scalar binding and function entry of `src` lands in `dst`;
/// call-site lists follow unless the clone flags exclude them.
pub fn clone_into(
    src: &HeapGraph,
    dst: &mut HeapGraph,
    flags: CloneFlags,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let mut rc = ReachabilityCloner::new(src, flags);

    for id in src.node_ids() {
        rc.get_cloned(dst, NodeHandle::at(id), ecs);
    }

    for (v, h) in src.scalar_entries() {
        let cloned = rc.get_cloned(dst, h, ecs);
        dst.bind_scalar(v, cloned, ecs);
    }

    for (f, entry) in src.entries() {
        let cloned = rc.clone_entry(dst, entry, ecs);
        dst.set_entry(f, cloned, ecs);
    }

    if !flags.contains(CloneFlags::DONT_CLONE_CALL_NODES) {
        for cs in src.function_calls() {
            let cloned = rc.clone_call_site(dst, cs, ecs);
            dst.function_calls_mut().push(cloned);
        }
    }

    if !flags.contains(CloneFlags::DONT_CLONE_AUX_CALL_NODES) {
        for cs in src.aux_calls() {
            let cloned = rc.clone_call_site(dst, cs, ecs);
            dst.aux_calls_mut().push(cloned);
        }
    }
}

/// Pull globals-graph structure for every global `dst` already mentions
pub fn clone_globals_from(
    dst: &mut HeapGraph,
    globals_graph: &HeapGraph,
    flags: CloneFlags,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let mut rc = ReachabilityCloner::new(globals_graph, flags);
    rc.merge_common_globals(dst, ecs);
}

/// Clone everything reachable from `src`'s globals into the globals graph
pub fn export_globals_into(
    src: &HeapGraph,
    globals_graph: &mut HeapGraph,
    ecs: &mut GlobalEquivalenceClasses,
) {
    let mut rc = ReachabilityCloner::new(src, CloneFlags::STRIP_ALLOCA_BIT);
    let roots: Vec<NodeHandle> = src.global_entries().map(|(_, h)| h).collect();
    for h in roots {
        rc.get_cloned(globals_graph, h, ecs);
    }
}
