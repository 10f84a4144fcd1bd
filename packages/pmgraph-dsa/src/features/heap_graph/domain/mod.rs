pub mod call_site;
pub mod flags;
pub mod global_ecs;
pub mod node;

pub use call_site::{CalleeRef, DsCallSite, FunctionEntry};
pub use flags::{CloneFlags, MarkFlags, NodeFlags};
pub use global_ecs::GlobalEquivalenceClasses;
pub use node::{DsNode, GlobalValue, NodeHandle, NodeId, Value};
