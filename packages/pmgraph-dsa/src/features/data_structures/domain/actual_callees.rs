//! Resolved call targets
//!
//! An ordered set of `(call, callee)` pairs. Ordering by call first makes
//! "all callees of one call" a contiguous range.

use crate::features::ir::{CallInstId, FunctionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualCallees {
    pairs: BTreeSet<(CallInstId, FunctionId)>,
}

impl ActualCallees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns true when it was new
    pub fn insert(&mut self, call: CallInstId, callee: FunctionId) -> bool {
        self.pairs.insert((call, callee))
    }

    pub fn contains(&self, call: CallInstId, callee: FunctionId) -> bool {
        self.pairs.contains(&(call, callee))
    }

    /// Callees of one call, ascending
    pub fn callees(&self, call: CallInstId) -> impl Iterator<Item = FunctionId> + '_ {
        self.pairs
            .range((call, FunctionId(0))..=(call, FunctionId(u32::MAX)))
            .map(|(_, f)| *f)
    }

    pub fn has_callees(&self, call: CallInstId) -> bool {
        self.callees(call).next().is_some()
    }

    /// Union with another index
    pub fn extend(&mut self, other: &ActualCallees) {
        self.pairs.extend(other.pairs.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = (CallInstId, FunctionId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Distinct call instructions with at least one callee
    pub fn calls(&self) -> impl Iterator<Item = CallInstId> + '_ {
        let mut last = None;
        self.pairs.iter().filter_map(move |(call, _)| {
            if last == Some(*call) {
                None
            } else {
                last = Some(*call);
                Some(*call)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
