//! Call-site records and function entries

use super::node::NodeHandle;
use crate::features::ir::{CallInstId, FunctionId};
use serde::{Deserialize, Serialize};

/// Callee of a recorded call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalleeRef {
    Direct(FunctionId),
    /// Node of the function pointer being called through
    Indirect(NodeHandle),
}

/// One call instruction as seen by a graph
///
/// `args[i]` is `None` when the actual is a null constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsCallSite {
    pub call: CallInstId,
    /// Function that contains the call instruction
    pub caller: FunctionId,
    pub callee: CalleeRef,
    pub ret: Option<NodeHandle>,
    pub args: Vec<Option<NodeHandle>>,
}

impl DsCallSite {
    #[inline]
    pub fn is_indirect(&self) -> bool {
        matches!(self.callee, CalleeRef::Indirect(_))
    }

    pub fn direct_callee(&self) -> Option<FunctionId> {
        match self.callee {
            CalleeRef::Direct(f) => Some(f),
            CalleeRef::Indirect(_) => None,
        }
    }

    pub fn num_ptr_args(&self) -> usize {
        self.args.iter().filter(|a| a.is_some()).count()
    }

    /// No pointer flows through this call
    pub fn is_noop(&self) -> bool {
        self.ret.is_none() && self.num_ptr_args() == 0
    }

    /// Return value and pointer arguments
    pub fn actual_handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.ret.into_iter().chain(self.args.iter().flatten().copied())
    }

    /// Every handle the call site mentions, callee node included
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        let callee = match self.callee {
            CalleeRef::Indirect(h) => Some(h),
            CalleeRef::Direct(_) => None,
        };
        self.actual_handles().chain(callee)
    }

    /// Apply `f` to every handle in place
    pub fn map_handles(&mut self, mut f: impl FnMut(NodeHandle) -> NodeHandle) {
        if let Some(ret) = self.ret.as_mut() {
            *ret = f(*ret);
        }
        for arg in self.args.iter_mut().flatten() {
            *arg = f(*arg);
        }
        if let CalleeRef::Indirect(h) = &mut self.callee {
            *h = f(*h);
        }
    }
}

/// Formal-side view of a function represented in a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// One handle per formal parameter
    pub args: Vec<NodeHandle>,
    pub ret: Option<NodeHandle>,
    /// Pointees of arguments passed through `...`
    pub vararg: Option<NodeHandle>,
}

impl FunctionEntry {
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.args.iter().copied().chain(self.ret).chain(self.vararg)
    }

    pub fn map_handles(&mut self, mut f: impl FnMut(NodeHandle) -> NodeHandle) {
        for arg in &mut self.args {
            *arg = f(*arg);
        }
        if let Some(ret) = self.ret.as_mut() {
            *ret = f(*ret);
        }
        if let Some(va) = self.vararg.as_mut() {
            *va = f(*va);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::heap_graph::domain::NodeId;

    #[test]
    fn test_noop_call_has_no_pointer_flow() {
        let cs = DsCallSite {
            call: CallInstId(0),
            caller: FunctionId(0),
            callee: CalleeRef::Direct(FunctionId(1)),
            ret: None,
            args: vec![None, None],
        };
        assert!(cs.is_noop());
        assert_eq!(cs.handles().count(), 0);
    }

    #[test]
    fn test_handles_cover_callee_node() {
        let cs = DsCallSite {
            call: CallInstId(0),
            caller: FunctionId(0),
            callee: CalleeRef::Indirect(NodeHandle::at(NodeId(9))),
            ret: Some(NodeHandle::at(NodeId(1))),
            args: vec![Some(NodeHandle::at(NodeId(2)))],
        };
        let nodes: Vec<_> = cs.handles().map(|h| h.node.0).collect();
        assert_eq!(nodes, vec![1, 2, 9]);
        assert!(!cs.is_noop());
    }
}
