//! HeapGraph core: node arena, unification and the scalar map
//!
//! Unification never rewrites existing handles. The absorbed node keeps a
//! forwarding handle to the survivor and every lookup goes through
//! [`HeapGraph::resolve`]. [`HeapGraph::canonicalize`] rewrites all stored
//! handles and drops the forwarding nodes in one sweep.
//!
//! Merging two handles whose field offsets disagree folds both nodes
//! (`COLLAPSED`): every field then lives at offset 0.

use crate::features::heap_graph::domain::{
    DsCallSite, DsNode, FunctionEntry, GlobalEquivalenceClasses, GlobalValue, NodeFlags,
    NodeHandle, NodeId, Value,
};
use crate::features::ir::{CallInstId, FunctionId};
use std::collections::BTreeMap;

/// Points-to graph of one function (or of several, after collapse)
#[derive(Debug, Clone, Default)]
pub struct HeapGraph {
    /// Node arena; `None` marks a deleted slot
    nodes: Vec<Option<DsNode>>,

    scalar_map: BTreeMap<Value, NodeHandle>,

    /// Functions this graph represents, with their formal-side handles
    functions: BTreeMap<FunctionId, FunctionEntry>,

    /// Call sites of the represented functions' bodies
    function_calls: Vec<DsCallSite>,

    /// Call sites not resolved yet
    aux_calls: Vec<DsCallSite>,
}

impl HeapGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Nodes
    // ═══════════════════════════════════════════════════════════════════

    pub fn add_node(&mut self, flags: NodeFlags) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(DsNode::with_flags(flags)));
        id
    }

    /// Node by id; panics on a deleted slot
    pub fn node(&self, id: NodeId) -> &DsNode {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("dangling node handle {}", id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DsNode {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("dangling node handle {}", id))
    }

    pub fn try_node(&self, id: NodeId) -> Option<&DsNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Node a handle designates after following forwards
    pub fn node_of(&self, h: NodeHandle) -> &DsNode {
        self.node(self.resolve(h).node)
    }

    /// Ids of live, non-forwarding nodes in ascending order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, slot)| match slot {
            Some(node) if !node.is_forwarding() => Some(NodeId(i as u32)),
            _ => None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_ids().count()
    }

    pub(crate) fn delete_node(&mut self, id: NodeId) {
        if let Some(slot) = self.nodes.get_mut(id.index()) {
            *slot = None;
        }
    }

    /// Follow forwarding links to the representative handle
    pub fn resolve(&self, mut h: NodeHandle) -> NodeHandle {
        loop {
            let node = self.node(h.node);
            match node.forward {
                Some(fwd) => h = NodeHandle::new(fwd.node, h.offset + fwd.offset),
                None => {
                    if node.is_collapsed() {
                        h.offset = 0;
                    }
                    return h;
                }
            }
        }
    }

    pub fn add_flags(&mut self, h: NodeHandle, flags: NodeFlags) {
        let h = self.resolve(h);
        self.node_mut(h.node).flags.insert(flags);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Links
    // ═══════════════════════════════════════════════════════════════════

    /// Pointee stored at the handle's field, if any
    pub fn link(&self, h: NodeHandle) -> Option<NodeHandle> {
        let h = self.resolve(h);
        self.node(h.node)
            .links
            .get(&h.offset)
            .map(|target| self.resolve(*target))
    }

    /// Pointee at the handle's field, creating an empty node when missing
    pub fn link_or_create(&mut self, h: NodeHandle) -> NodeHandle {
        if let Some(target) = self.link(h) {
            return target;
        }
        let h = self.resolve(h);
        let target = NodeHandle::at(self.add_node(NodeFlags::empty()));
        self.node_mut(h.node).links.insert(h.offset, target);
        target
    }

    /// Make `src`'s field point to `dst`, unifying with any existing pointee
    pub fn add_link(&mut self, src: NodeHandle, dst: NodeHandle, ecs: &mut GlobalEquivalenceClasses) {
        let src = self.resolve(src);
        match self.node(src.node).links.get(&src.offset).copied() {
            Some(existing) => self.merge(existing, dst, ecs),
            None => {
                self.node_mut(src.node).links.insert(src.offset, dst);
            }
        }
    }

    /// Resolved outgoing links of a node
    pub fn links_of(&self, id: NodeId) -> Vec<(u32, NodeHandle)> {
        self.node(id)
            .links
            .iter()
            .map(|(off, target)| (*off, self.resolve(*target)))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Unification
    // ═══════════════════════════════════════════════════════════════════

    /// Unify the objects designated by `a` and `b`
    ///
    /// Pointees at matching fields are unified recursively (worklist, no
    /// recursion). Globals brought together in one node are unioned in `ecs`.
    pub fn merge(&mut self, a: NodeHandle, b: NodeHandle, ecs: &mut GlobalEquivalenceClasses) {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            let a = self.resolve(a);
            let b = self.resolve(b);

            if a.node == b.node {
                if a.offset != b.offset {
                    self.collapse_node(a.node, &mut pending);
                }
                continue;
            }

            if a.offset != b.offset {
                self.collapse_node(a.node, &mut pending);
                self.collapse_node(b.node, &mut pending);
            }

            let (keep, gone) = if a.node < b.node {
                (a.node, b.node)
            } else {
                (b.node, a.node)
            };
            self.absorb_node(keep, gone, ecs, &mut pending);
        }
    }

    /// Fold every field of a node into offset 0
    pub fn collapse(&mut self, h: NodeHandle, ecs: &mut GlobalEquivalenceClasses) {
        let node = self.resolve(h).node;
        let mut pending = Vec::new();
        self.collapse_node(node, &mut pending);
        for (a, b) in pending {
            self.merge(a, b, ecs);
        }
    }

    fn collapse_node(&mut self, id: NodeId, pending: &mut Vec<(NodeHandle, NodeHandle)>) {
        let node = self.node_mut(id);
        if node.is_collapsed() {
            return;
        }
        node.flags.insert(NodeFlags::COLLAPSED);
        let links = std::mem::take(&mut node.links);
        let mut targets = links.into_values();
        if let Some(first) = targets.next() {
            node.links.insert(0, first);
            pending.extend(targets.map(|other| (first, other)));
        }
    }

    fn absorb_node(
        &mut self,
        keep: NodeId,
        gone: NodeId,
        ecs: &mut GlobalEquivalenceClasses,
        pending: &mut Vec<(NodeHandle, NodeHandle)>,
    ) {
        let gone_node = std::mem::replace(
            self.node_mut(gone),
            DsNode {
                forward: Some(NodeHandle::at(keep)),
                ..Default::default()
            },
        );

        if gone_node.is_collapsed() {
            self.collapse_node(keep, pending);
        }

        let keep_node = self.node_mut(keep);
        keep_node.flags.insert(gone_node.flags);
        let keep_collapsed = keep_node.is_collapsed();

        if let Some(&anchor) = keep_node
            .globals
            .iter()
            .next()
            .or_else(|| gone_node.globals.iter().next())
        {
            for gv in keep_node.globals.iter().chain(gone_node.globals.iter()) {
                ecs.union(anchor, *gv);
            }
        }
        keep_node.globals.extend(gone_node.globals);

        for (offset, target) in gone_node.links {
            let offset = if keep_collapsed { 0 } else { offset };
            match keep_node.links.get(&offset) {
                Some(existing) => pending.push((*existing, target)),
                None => {
                    keep_node.links.insert(offset, target);
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scalar map
    // ═══════════════════════════════════════════════════════════════════

    pub fn scalar(&self, v: Value) -> Option<NodeHandle> {
        self.scalar_map.get(&v).map(|h| self.resolve(*h))
    }

    /// Bind a value, unifying with an existing binding
    pub fn bind_scalar(&mut self, v: Value, h: NodeHandle, ecs: &mut GlobalEquivalenceClasses) {
        match self.scalar_map.get(&v).copied() {
            Some(existing) => self.merge(existing, h, ecs),
            None => {
                self.scalar_map.insert(v, h);
            }
        }
    }

    /// Handle for a value, creating an empty node when unbound
    pub fn scalar_or_create(&mut self, v: Value) -> NodeHandle {
        if let Some(h) = self.scalar(v) {
            return h;
        }
        let h = NodeHandle::at(self.add_node(NodeFlags::empty()));
        self.scalar_map.insert(v, h);
        h
    }

    /// Node holding a global's storage, creating it on first use
    pub fn global_node(&mut self, gv: GlobalValue, ecs: &mut GlobalEquivalenceClasses) -> NodeHandle {
        if let Some(h) = self.scalar(Value::Global(gv)) {
            return h;
        }
        ecs.insert(gv);
        let id = self.add_node(NodeFlags::GLOBAL);
        self.node_mut(id).globals.insert(gv);
        let h = NodeHandle::at(id);
        self.scalar_map.insert(Value::Global(gv), h);
        h
    }

    /// Resolved scalar entries in key order
    pub fn scalar_entries(&self) -> impl Iterator<Item = (Value, NodeHandle)> + '_ {
        self.scalar_map.iter().map(|(v, h)| (*v, self.resolve(*h)))
    }

    /// Resolved entries of global values only
    pub fn global_entries(&self) -> impl Iterator<Item = (GlobalValue, NodeHandle)> + '_ {
        self.scalar_entries()
            .filter_map(|(v, h)| v.as_global().map(|gv| (gv, h)))
    }

    pub(crate) fn remove_scalar(&mut self, v: Value) {
        self.scalar_map.remove(&v);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Functions and call sites
    // ═══════════════════════════════════════════════════════════════════

    pub fn entry(&self, f: FunctionId) -> Option<&FunctionEntry> {
        self.functions.get(&f)
    }

    pub fn entry_mut(&mut self, f: FunctionId) -> Option<&mut FunctionEntry> {
        self.functions.get_mut(&f)
    }

    /// Register (or unify with) the formal-side entry of a function
    pub fn set_entry(&mut self, f: FunctionId, entry: FunctionEntry, ecs: &mut GlobalEquivalenceClasses) {
        let Some(existing) = self.functions.get(&f).cloned() else {
            self.functions.insert(f, entry);
            return;
        };
        let merged = self.merge_entries(existing, entry, ecs);
        self.functions.insert(f, merged);
    }

    /// Unify two formal-side views position by position
    pub fn merge_entries(
        &mut self,
        a: FunctionEntry,
        b: FunctionEntry,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> FunctionEntry {
        let mut merged = a;
        for (i, arg) in b.args.into_iter().enumerate() {
            match merged.args.get(i).copied() {
                Some(existing) => self.merge(existing, arg, ecs),
                None => merged.args.push(arg),
            }
        }
        merged.ret = self.merge_optional(merged.ret, b.ret, ecs);
        merged.vararg = self.merge_optional(merged.vararg, b.vararg, ecs);
        merged
    }

    fn merge_optional(
        &mut self,
        a: Option<NodeHandle>,
        b: Option<NodeHandle>,
        ecs: &mut GlobalEquivalenceClasses,
    ) -> Option<NodeHandle> {
        match (a, b) {
            (Some(a), Some(b)) => {
                self.merge(a, b, ecs);
                Some(a)
            }
            (a, b) => a.or(b),
        }
    }

    /// Functions represented by this graph
    pub fn represented_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (FunctionId, &FunctionEntry)> + '_ {
        self.functions.iter().map(|(f, e)| (*f, e))
    }

    pub fn contains_function(&self, f: FunctionId) -> bool {
        self.functions.contains_key(&f)
    }

    pub fn function_calls(&self) -> &[DsCallSite] {
        &self.function_calls
    }

    pub fn function_calls_mut(&mut self) -> &mut Vec<DsCallSite> {
        &mut self.function_calls
    }

    pub fn aux_calls(&self) -> &[DsCallSite] {
        &self.aux_calls
    }

    pub fn aux_calls_mut(&mut self) -> &mut Vec<DsCallSite> {
        &mut self.aux_calls
    }

    pub fn take_aux_calls(&mut self) -> Vec<DsCallSite> {
        std::mem::take(&mut self.aux_calls)
    }

    /// Call site of this graph's own bodies by instruction id
    pub fn function_call(&self, call: CallInstId) -> Option<&DsCallSite> {
        self.function_calls.iter().find(|cs| cs.call == call)
    }

    /// Call site with every handle resolved
    pub fn resolved_call(&self, cs: &DsCallSite) -> DsCallSite {
        let mut cs = cs.clone();
        cs.map_handles(|h| self.resolve(h));
        cs
    }

    // ═══════════════════════════════════════════════════════════════════
    // Canonical form
    // ═══════════════════════════════════════════════════════════════════

    /// Rewrite all stored handles to their representatives and delete
    /// forwarding nodes
    pub fn canonicalize(&mut self) {
        let resolved_scalars: Vec<(Value, NodeHandle)> = self.scalar_entries().collect();
        self.scalar_map = resolved_scalars.into_iter().collect();

        let mut functions = std::mem::take(&mut self.functions);
        for entry in functions.values_mut() {
            entry.map_handles(|h| self.resolve(h));
        }
        self.functions = functions;

        let mut calls = std::mem::take(&mut self.function_calls);
        for cs in &mut calls {
            cs.map_handles(|h| self.resolve(h));
        }
        self.function_calls = calls;

        let mut aux = std::mem::take(&mut self.aux_calls);
        for cs in &mut aux {
            cs.map_handles(|h| self.resolve(h));
        }
        self.aux_calls = aux;

        let ids: Vec<NodeId> = self.node_ids().collect();
        for id in ids {
            let links = self.links_of(id);
            self.node_mut(id).links = links.into_iter().collect();
        }

        for slot in &mut self.nodes {
            if slot.as_ref().is_some_and(DsNode::is_forwarding) {
                *slot = None;
            }
        }
    }
}
