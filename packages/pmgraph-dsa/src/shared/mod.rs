//! Shared infrastructure used by several analysis stages

pub mod union_find;

pub use union_find::{KeyedUnionFind, UnionFind};
