//! Union-Find (Disjoint Set Union)
//!
//! Index-based core with path compression and union by rank, plus a keyed
//! wrapper that interns arbitrary ids (globals, functions) on first use.
//!
//! Partitions built here only ever grow: there is no split or delete, which
//! is what lets the equivalence classes be threaded monotonically through
//! every analysis stage.
//!
//! # References
//! - Tarjan, R. E. "Efficiency of a Good But Not Linear Set Union Algorithm" (1975)

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::hash::Hash;

/// Union-Find over dense `u32` indices
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    /// Parent pointers (self-loop = root)
    parent: Vec<u32>,

    /// Rank (tree height upper bound)
    rank: Vec<u8>,

    /// Number of disjoint sets
    set_count: usize,
}

impl UnionFind {
    /// Create a Union-Find with n singleton elements
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
            rank: vec![0; n],
            set_count: n,
        }
    }

    /// Append a new singleton element and return its index
    pub fn push(&mut self) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(idx);
        self.rank.push(0);
        self.set_count += 1;
        idx
    }

    /// Find the representative of x, compressing the path
    #[inline]
    pub fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }

        let mut current = x;
        while self.parent[current as usize] != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }
        root
    }

    /// Find without path compression (for read-only queries)
    #[inline]
    pub fn find_readonly(&self, x: u32) -> u32 {
        let mut current = x;
        while self.parent[current as usize] != current {
            current = self.parent[current as usize];
        }
        current
    }

    /// Union two sets by rank and return the new representative
    pub fn union(&mut self, x: u32, y: u32) -> u32 {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return root_x;
        }

        let (rx, ry) = (root_x as usize, root_y as usize);
        let new_root = match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => {
                self.parent[rx] = root_y;
                root_y
            }
            std::cmp::Ordering::Greater => {
                self.parent[ry] = root_x;
                root_x
            }
            std::cmp::Ordering::Equal => {
                self.parent[ry] = root_x;
                self.rank[rx] += 1;
                root_x
            }
        };

        self.set_count -= 1;
        new_root
    }

    /// Number of disjoint sets
    #[inline]
    pub fn count(&self) -> usize {
        self.set_count
    }

    /// Total number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Union-Find keyed by an arbitrary id type
///
/// Keys are interned on first mention; a key never seen is its own class.
#[derive(Debug, Clone)]
pub struct KeyedUnionFind<K> {
    key_to_index: FxHashMap<K, u32>,
    index_to_key: Vec<K>,
    uf: UnionFind,
}

impl<K> Default for KeyedUnionFind<K> {
    fn default() -> Self {
        Self {
            key_to_index: FxHashMap::default(),
            index_to_key: Vec::new(),
            uf: UnionFind::default(),
        }
    }
}

impl<K: Copy + Eq + Hash + Ord> KeyedUnionFind<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, key: K) -> u32 {
        if let Some(&idx) = self.key_to_index.get(&key) {
            return idx;
        }
        let idx = self.uf.push();
        self.key_to_index.insert(key, idx);
        self.index_to_key.push(key);
        idx
    }

    /// Register a key as (at least) a singleton class
    pub fn insert(&mut self, key: K) {
        self.intern(key);
    }

    /// Merge the classes of two keys; returns the new leader
    pub fn union(&mut self, a: K, b: K) -> K {
        let ia = self.intern(a);
        let ib = self.intern(b);
        let root = self.uf.union(ia, ib);
        self.index_to_key[root as usize]
    }

    /// Leader of the class containing key (the key itself if unknown)
    pub fn leader(&self, key: K) -> K {
        match self.key_to_index.get(&key) {
            Some(&idx) => self.index_to_key[self.uf.find_readonly(idx) as usize],
            None => key,
        }
    }

    /// Whether two keys are in the same class
    pub fn same_class(&self, a: K, b: K) -> bool {
        a == b || self.leader(a) == self.leader(b)
    }

    /// Whether the key has ever been mentioned
    pub fn contains(&self, key: K) -> bool {
        self.key_to_index.contains_key(&key)
    }

    /// All members of the class containing key, sorted
    pub fn members(&self, key: K) -> Vec<K> {
        let leader = self.leader(key);
        let mut members: Vec<K> = self
            .index_to_key
            .iter()
            .copied()
            .filter(|&k| self.leader(k) == leader)
            .collect();
        if members.is_empty() {
            members.push(key);
        }
        members.sort();
        members
    }

    /// All classes keyed by leader; members sorted
    pub fn classes(&self) -> BTreeMap<K, Vec<K>> {
        let mut classes: BTreeMap<K, Vec<K>> = BTreeMap::new();
        for &key in &self.index_to_key {
            classes.entry(self.leader(key)).or_default().push(key);
        }
        for members in classes.values_mut() {
            members.sort();
        }
        classes
    }

    /// Union every class of `other` into this partition
    pub fn absorb(&mut self, other: &KeyedUnionFind<K>) {
        for &key in &other.index_to_key {
            let leader = other.leader(key);
            if leader == key {
                self.insert(key);
            } else {
                self.union(leader, key);
            }
        }
    }

    /// True when every pair joined here is also joined in `finer`
    ///
    /// i.e. `finer` only ever added unions on top of this partition.
    pub fn is_refined_by(&self, finer: &KeyedUnionFind<K>) -> bool {
        self.index_to_key
            .iter()
            .all(|&key| finer.same_class(self.leader(key), key))
    }

    /// Number of interned keys
    pub fn len(&self) -> usize {
        self.index_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_key.is_empty()
    }

    /// Number of classes among interned keys
    pub fn class_count(&self) -> usize {
        self.uf.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_union_find() {
        let mut uf = UnionFind::new(6);
        assert_eq!(uf.count(), 6);

        uf.union(0, 1);
        uf.union(2, 3);
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(0), uf.find(2));
        assert_eq!(uf.count(), 4);

        uf.union(1, 3);
        assert_eq!(uf.find(0), uf.find(2));
        assert_eq!(uf.count(), 3);
    }

    #[test]
    fn test_path_compression_flattens_chain() {
        let mut uf = UnionFind::new(64);
        for i in 0..63 {
            uf.union(i, i + 1);
        }
        let root = uf.find(0);
        for i in 0..64 {
            assert_eq!(uf.find_readonly(i), root);
        }
    }

    #[test]
    fn test_keyed_leader_of_unknown_key_is_itself() {
        let uf: KeyedUnionFind<u32> = KeyedUnionFind::new();
        assert_eq!(uf.leader(42), 42);
        assert!(uf.same_class(42, 42));
        assert!(!uf.contains(42));
    }

    #[test]
    fn test_keyed_members_and_classes() {
        let mut uf = KeyedUnionFind::new();
        uf.union(10u32, 30);
        uf.union(30, 20);
        uf.insert(99);

        assert_eq!(uf.members(20), vec![10, 20, 30]);
        let classes = uf.classes();
        assert_eq!(classes.len(), 2);
        assert_eq!(uf.class_count(), 2);
        assert!(classes.values().any(|m| m == &vec![99]));
    }

    #[test]
    fn test_absorb_preserves_both_partitions() {
        let mut a = KeyedUnionFind::new();
        a.union(1u32, 2);
        let mut b = KeyedUnionFind::new();
        b.union(3u32, 4);
        b.union(2, 5);

        let before = a.clone();
        a.absorb(&b);
        assert!(before.is_refined_by(&a));
        assert!(b.is_refined_by(&a));
        assert!(a.same_class(1, 5));
        assert!(!a.same_class(1, 3));
    }

    proptest! {
        #[test]
        fn prop_unions_only_grow_classes(pairs in proptest::collection::vec((0u32..40, 0u32..40), 0..60), split in 0usize..60) {
            let split = split.min(pairs.len());
            let mut uf = KeyedUnionFind::new();
            for &(a, b) in &pairs[..split] {
                uf.union(a, b);
            }
            let snapshot = uf.clone();
            for &(a, b) in &pairs[split..] {
                uf.union(a, b);
            }
            prop_assert!(snapshot.is_refined_by(&uf));
            for &(a, b) in &pairs {
                prop_assert!(uf.same_class(a, b));
            }
        }
    }
}
