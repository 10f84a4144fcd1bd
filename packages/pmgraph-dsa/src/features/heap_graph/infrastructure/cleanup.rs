//! Dead-node removal and incompleteness marking

use super::cloner::ReachabilityCloner;
use super::graph::HeapGraph;
use crate::features::heap_graph::domain::{
    CloneFlags, GlobalEquivalenceClasses, MarkFlags, NodeFlags, NodeHandle, NodeId, Value,
};
use crate::features::ir::FunctionId;
use rustc_hash::FxHashSet;

impl HeapGraph {
    /// Handles that anchor liveness: local scalars, function entries and
    /// call sites
    fn non_global_roots(&self) -> Vec<NodeHandle> {
        let mut roots: Vec<NodeHandle> = self
            .scalar_entries()
            .filter(|(v, _)| matches!(v, Value::Local(..)))
            .map(|(_, h)| h)
            .collect();
        for (_, entry) in self.entries() {
            roots.extend(entry.handles());
        }
        for cs in self.function_calls().iter().chain(self.aux_calls()) {
            roots.extend(cs.handles());
        }
        roots
    }

    /// Mark everything reachable from `roots` into `alive`
    fn mark_reachable(&self, roots: impl IntoIterator<Item = NodeHandle>, alive: &mut FxHashSet<NodeId>) {
        let mut stack: Vec<NodeId> = roots.into_iter().map(|h| self.resolve(h).node).collect();
        while let Some(id) = stack.pop() {
            if !alive.insert(id) {
                continue;
            }
            stack.extend(
                self.links_of(id)
                    .into_iter()
                    .map(|(_, target)| target.node)
                    .filter(|n| !alive.contains(n)),
            );
        }
    }

    /// Whether some node reachable from `start` is in `alive`
    fn reaches_alive(&self, start: NodeId, alive: &FxHashSet<NodeId>) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for (_, target) in self.links_of(id) {
                if alive.contains(&target.node) {
                    return true;
                }
                stack.push(target.node);
            }
        }
        false
    }

    /// Drop nodes nothing refers to
    ///
    /// A node survives while a scalar, a function entry, a call site or
    /// another node's link refers to it, or while it represents a global.
    pub fn remove_trivially_dead_nodes(&mut self) {
        self.canonicalize();
        loop {
            let mut referenced: FxHashSet<NodeId> = self
                .scalar_entries()
                .map(|(_, h)| h.node)
                .chain(self.non_global_roots().into_iter().map(|h| h.node))
                .collect();
            for id in self.node_ids() {
                referenced.extend(
                    self.node(id)
                        .links
                        .values()
                        .map(|t| t.node)
                        .filter(|&t| t != id),
                );
            }

            let dead: Vec<NodeId> = self
                .node_ids()
                .filter(|id| !referenced.contains(id) && self.node(*id).globals.is_empty())
                .collect();
            if dead.is_empty() {
                return;
            }
            for id in dead {
                self.delete_node(id);
            }
        }
    }

    /// Delete nodes unreachable from locals, entries and call sites
    ///
    /// With `keep_unreachable_globals`, a global node that can reach a live
    /// node is live too (to a fixpoint). Global nodes that die are cloned
    /// into `globals_graph` first, so their structure is not lost.
    pub fn remove_dead_nodes(
        &mut self,
        keep_unreachable_globals: bool,
        globals_graph: Option<&mut HeapGraph>,
        ecs: &mut GlobalEquivalenceClasses,
    ) {
        self.canonicalize();

        let mut alive = FxHashSet::default();
        self.mark_reachable(self.non_global_roots(), &mut alive);

        let global_nodes: Vec<NodeId> = {
            let mut ids: Vec<NodeId> = self.global_entries().map(|(_, h)| h.node).collect();
            ids.sort();
            ids.dedup();
            ids
        };

        if keep_unreachable_globals {
            loop {
                let newly_live: Vec<NodeId> = global_nodes
                    .iter()
                    .copied()
                    .filter(|id| !alive.contains(id) && self.reaches_alive(*id, &alive))
                    .collect();
                if newly_live.is_empty() {
                    break;
                }
                self.mark_reachable(newly_live.into_iter().map(NodeHandle::at), &mut alive);
            }
        }

        let dead_globals: Vec<NodeId> = global_nodes
            .iter()
            .copied()
            .filter(|id| !alive.contains(id))
            .collect();

        if let Some(gg) = globals_graph {
            let mut rc = ReachabilityCloner::new(
                self,
                CloneFlags::STRIP_ALLOCA_BIT
                    | CloneFlags::DONT_CLONE_CALL_NODES
                    | CloneFlags::DONT_CLONE_AUX_CALL_NODES,
            );
            for id in &dead_globals {
                rc.get_cloned(gg, NodeHandle::at(*id), ecs);
            }
        }

        let dead_scalars: Vec<Value> = self
            .scalar_entries()
            .filter(|(_, h)| !alive.contains(&h.node))
            .map(|(v, _)| v)
            .collect();
        for v in dead_scalars {
            self.remove_scalar(v);
        }

        let dead: Vec<NodeId> = self.node_ids().filter(|id| !alive.contains(id)).collect();
        for id in dead {
            self.delete_node(id);
        }
    }

    /// Clear every incomplete marker
    pub fn mask_incomplete_markers(&mut self) {
        let ids: Vec<NodeId> = self.node_ids().collect();
        for id in ids {
            self.node_mut(id).flags.remove(NodeFlags::INCOMPLETE);
        }
    }

    /// Recompute incompleteness from scratch-masked markers
    ///
    /// Sources: formals/return/vararg of functions accepted by
    /// `formal_filter` (with `MARK_FORMAL_ARGS`), everything an unresolved
    /// call passes or returns, unknown and external nodes, and global variables unless
    /// `IGNORE_GLOBALS`. Marking spreads to everything reachable.
    pub fn mark_incomplete_nodes(&mut self, flags: MarkFlags, formal_filter: impl Fn(FunctionId) -> bool) {
        let mut roots: Vec<NodeHandle> = Vec::new();

        if flags.contains(MarkFlags::MARK_FORMAL_ARGS) {
            for (f, entry) in self.entries() {
                if formal_filter(f) {
                    roots.extend(entry.handles());
                }
            }
        }

        for cs in self.aux_calls() {
            roots.extend(cs.actual_handles());
        }

        for id in self.node_ids() {
            let node = self.node(id);
            if node.flags.intersects(NodeFlags::UNKNOWN | NodeFlags::EXTERNAL) {
                roots.push(NodeHandle::at(id));
            }
        }

        if !flags.contains(MarkFlags::IGNORE_GLOBALS) {
            roots.extend(
                self.global_entries()
                    .filter(|(gv, _)| gv.is_variable())
                    .map(|(_, h)| h),
            );
        }

        let mut marked = FxHashSet::default();
        self.mark_reachable(roots, &mut marked);
        for id in marked {
            self.node_mut(id).flags.insert(NodeFlags::INCOMPLETE);
        }
    }

    /// Nodes currently marked incomplete
    pub fn incomplete_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|id| self.node(*id).is_incomplete())
            .collect()
    }
}
