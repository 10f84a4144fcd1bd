pub mod actual_callees;
pub mod graph_arena;
pub mod stage;

pub use actual_callees::ActualCallees;
pub use graph_arena::{GraphArena, GraphId};
pub use stage::{StageGraphs, StageKind, StageSummary};
