//! Nodes, handles and the values that point into them

use super::flags::NodeFlags;
use crate::features::ir::{FunctionId, GlobalId, LocalId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index of a node in its graph's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A field of a node
///
/// Handles may point at forwarded nodes; always resolve them through the
/// owning graph before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub node: NodeId,
    pub offset: u32,
}

impl NodeHandle {
    #[inline]
    pub fn new(node: NodeId, offset: u32) -> Self {
        Self { node, offset }
    }

    /// Handle to field 0
    #[inline]
    pub fn at(node: NodeId) -> Self {
        Self { node, offset: 0 }
    }

    /// Same node, `delta` fields further
    #[inline]
    pub fn field(self, delta: u32) -> Self {
        Self {
            node: self.node,
            offset: self.offset + delta,
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}+{}", self.node, self.offset)
        }
    }
}

/// Global symbol whose storage a node can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalValue {
    Variable(GlobalId),
    Function(FunctionId),
}

impl GlobalValue {
    pub fn as_function(self) -> Option<FunctionId> {
        match self {
            GlobalValue::Function(f) => Some(f),
            GlobalValue::Variable(_) => None,
        }
    }

    #[inline]
    pub fn is_variable(self) -> bool {
        matches!(self, GlobalValue::Variable(_))
    }
}

impl fmt::Display for GlobalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalValue::Variable(g) => write!(f, "{}", g),
            GlobalValue::Function(func) => write!(f, "{}", func),
        }
    }
}

/// Key of the scalar map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Local SSA value of a function
    Local(FunctionId, LocalId),
    /// Address of a global symbol
    Global(GlobalValue),
}

impl Value {
    pub fn as_global(self) -> Option<GlobalValue> {
        match self {
            Value::Global(gv) => Some(gv),
            Value::Local(..) => None,
        }
    }
}

/// An abstract memory object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsNode {
    pub flags: NodeFlags,
    /// Outgoing pointers, keyed by field offset
    pub links: BTreeMap<u32, NodeHandle>,
    /// Globals whose storage this node represents
    pub globals: BTreeSet<GlobalValue>,
    /// Set once the node was unified into another one
    pub forward: Option<NodeHandle>,
}

impl DsNode {
    pub fn with_flags(flags: NodeFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_forwarding(&self) -> bool {
        self.forward.is_some()
    }

    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.flags.contains(NodeFlags::COLLAPSED)
    }

    #[inline]
    pub fn is_incomplete(&self) -> bool {
        self.flags.contains(NodeFlags::INCOMPLETE)
    }

    /// Functions this node may point to (function-pointer targets)
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.globals.iter().filter_map(|gv| gv.as_function())
    }

    pub fn has_global_variables(&self) -> bool {
        self.globals.iter().any(|gv| gv.is_variable())
    }
}
