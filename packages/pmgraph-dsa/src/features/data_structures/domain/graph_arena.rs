//! Arena of graphs addressed by stable ids
//!
//! Functions hold a [`GraphId`], never a graph. Collapsing an SCC takes the
//! superseded graphs out of their slots and repoints their functions; the
//! ids of freed slots are never reused within a stage.

use crate::features::heap_graph::HeapGraph;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub u32);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphArena {
    slots: Vec<Option<HeapGraph>>,
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, graph: HeapGraph) -> GraphId {
        let id = GraphId(self.slots.len() as u32);
        self.slots.push(Some(graph));
        id
    }

    pub fn get(&self, id: GraphId) -> Option<&HeapGraph> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: GraphId) -> Option<&mut HeapGraph> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Graph by id; panics when the slot was freed
    pub fn graph(&self, id: GraphId) -> &HeapGraph {
        self.get(id)
            .unwrap_or_else(|| panic!("graph {} was superseded or never created", id))
    }

    pub fn graph_mut(&mut self, id: GraphId) -> &mut HeapGraph {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("graph {} was superseded or never created", id))
    }

    /// Remove a graph, freeing its slot
    pub fn take(&mut self, id: GraphId) -> HeapGraph {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("graph {} was superseded or never created", id))
    }

    /// Put a graph obtained from [`GraphArena::take`] back into its slot
    pub fn restore(&mut self, id: GraphId, graph: HeapGraph) {
        let slot = &mut self.slots[id.0 as usize];
        assert!(slot.is_none(), "graph {} restored over a live graph", id);
        *slot = Some(graph);
    }

    /// Run `f` on one graph while the rest of the arena stays readable
    ///
    /// The graph is out of its slot for the duration of the call, so `f`
    /// must not look `id` up in the arena.
    pub fn with_graph_mut<R>(&mut self, id: GraphId, f: impl FnOnce(&mut HeapGraph, &GraphArena) -> R) -> R {
        let mut graph = self.take(id);
        let result = f(&mut graph, self);
        self.restore(id, graph);
        result
    }

    /// Live graphs in id order
    pub fn iter(&self) -> impl Iterator<Item = (GraphId, &HeapGraph)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|g| (GraphId(i as u32), g)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::heap_graph::NodeFlags;

    #[test]
    fn test_take_frees_slot_without_reusing_id() {
        let mut arena = GraphArena::new();
        let a = arena.insert(HeapGraph::new());
        arena.take(a);
        let b = arena.insert(HeapGraph::new());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_with_graph_mut_sees_other_graphs() {
        let mut arena = GraphArena::new();
        let mut other = HeapGraph::new();
        other.add_node(NodeFlags::HEAP);
        let a = arena.insert(HeapGraph::new());
        let b = arena.insert(other);

        let seen = arena.with_graph_mut(a, |g, rest| {
            g.add_node(NodeFlags::ALLOCA);
            rest.graph(b).node_count()
        });
        assert_eq!(seen, 1);
        assert_eq!(arena.graph(a).node_count(), 1);
    }
}
