//! Global value equivalence classes
//!
//! Globals that end up represented by one node are must-alias and are
//! unioned here. The partition is threaded through every stage and only
//! grows.

use super::node::GlobalValue;
use crate::shared::KeyedUnionFind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct GlobalEquivalenceClasses {
    classes: KeyedUnionFind<GlobalValue>,
}

impl GlobalEquivalenceClasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gv: GlobalValue) {
        self.classes.insert(gv);
    }

    pub fn union(&mut self, a: GlobalValue, b: GlobalValue) -> GlobalValue {
        self.classes.union(a, b)
    }

    /// Class representative
    pub fn leader(&self, gv: GlobalValue) -> GlobalValue {
        self.classes.leader(gv)
    }

    pub fn same_class(&self, a: GlobalValue, b: GlobalValue) -> bool {
        self.classes.same_class(a, b)
    }

    pub fn members(&self, gv: GlobalValue) -> Vec<GlobalValue> {
        self.classes.members(gv)
    }

    /// Merge another partition into this one
    pub fn absorb(&mut self, other: &GlobalEquivalenceClasses) {
        self.classes.absorb(&other.classes);
    }

    /// Every union recorded here also holds in `later`
    pub fn is_refined_by(&self, later: &GlobalEquivalenceClasses) -> bool {
        self.classes.is_refined_by(&later.classes)
    }

    /// Classes with more than one member
    pub fn non_trivial_classes(&self) -> BTreeMap<GlobalValue, Vec<GlobalValue>> {
        self.classes
            .classes()
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
