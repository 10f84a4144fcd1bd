//! Bit flags for nodes, clone operations and incompleteness marking

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Properties of an abstract memory object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NodeFlags: u16 {
        /// Stack allocation
        const ALLOCA = 1 << 0;
        const HEAP = 1 << 1;
        /// Storage of a global variable or a function
        const GLOBAL = 1 << 2;
        /// Pointer of unknown origin (int-to-ptr)
        const UNKNOWN = 1 << 3;
        /// Pointees not fully known in this graph
        const INCOMPLETE = 1 << 4;
        const MODIFIED = 1 << 5;
        const READ = 1 << 6;
        /// Fields folded into a single cell
        const COLLAPSED = 1 << 7;
        /// Reachable from code outside the module
        const EXTERNAL = 1 << 8;
    }
}

bitflags! {
    /// Options for cloning one graph into another
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CloneFlags: u8 {
        const STRIP_ALLOCA_BIT = 1 << 0;
        const STRIP_MOD_REF_BITS = 1 << 1;
        const STRIP_INCOMPLETE_BIT = 1 << 2;
        const DONT_CLONE_CALL_NODES = 1 << 3;
        const DONT_CLONE_AUX_CALL_NODES = 1 << 4;
    }
}

bitflags! {
    /// Options for incompleteness marking
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MarkFlags: u8 {
        /// Treat formal arguments and return values as incomplete
        const MARK_FORMAL_ARGS = 1 << 0;
        /// Do not mark global-variable nodes
        const IGNORE_GLOBALS = 1 << 1;
    }
}

impl NodeFlags {
    /// Names of the set flags, lowest bit first
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

impl CloneFlags {
    /// Node flags removed when cloning under these options
    pub fn stripped_node_flags(self) -> NodeFlags {
        let mut strip = NodeFlags::empty();
        if self.contains(Self::STRIP_ALLOCA_BIT) {
            strip |= NodeFlags::ALLOCA;
        }
        if self.contains(Self::STRIP_MOD_REF_BITS) {
            strip |= NodeFlags::MODIFIED | NodeFlags::READ;
        }
        if self.contains(Self::STRIP_INCOMPLETE_BIT) {
            strip |= NodeFlags::INCOMPLETE;
        }
        strip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_set_operations() {
        let mut flags = NodeFlags::HEAP | NodeFlags::READ;
        assert!(flags.contains(NodeFlags::HEAP));
        assert!(!flags.contains(NodeFlags::HEAP | NodeFlags::ALLOCA));
        assert!(flags.intersects(NodeFlags::HEAP | NodeFlags::ALLOCA));

        flags.remove(NodeFlags::READ);
        assert_eq!(flags, NodeFlags::HEAP);
        assert_eq!(flags.to_string(), "HEAP");
    }

    #[test]
    fn test_stripped_node_flags() {
        let strip = (CloneFlags::STRIP_ALLOCA_BIT | CloneFlags::STRIP_MOD_REF_BITS)
            .stripped_node_flags();
        let node = NodeFlags::ALLOCA | NodeFlags::MODIFIED | NodeFlags::INCOMPLETE;
        assert_eq!(node.difference(strip), NodeFlags::INCOMPLETE);
    }

    #[test]
    fn test_flags_serialize_by_name() {
        let json = serde_json::to_string(&(NodeFlags::HEAP | NodeFlags::GLOBAL)).unwrap();
        let back: NodeFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeFlags::HEAP | NodeFlags::GLOBAL);
    }
}
