//! Query port shared by every stage result
//!
//! Downstream clients (verifiers, instrumenters, pool allocators) depend on
//! this trait instead of on a concrete stage.

use crate::errors::{DsaError, Result};
use crate::features::data_structures::domain::{ActualCallees, StageGraphs, StageKind};
use crate::features::heap_graph::{GlobalEquivalenceClasses, HeapGraph};
use crate::features::ir::{CallInstId, FunctionId, Module};

pub trait DataStructureInfo {
    /// Underlying graphs of the stage
    fn stage(&self) -> &StageGraphs;

    fn stage_kind(&self) -> StageKind {
        self.stage().kind
    }

    fn has_graph(&self, f: FunctionId) -> bool {
        self.stage().has_graph(f)
    }

    /// Graph of a function; the same instance on every call
    fn graph(&self, f: FunctionId) -> Result<&HeapGraph> {
        let stage = self.stage();
        stage
            .graph_of(f)
            .ok_or_else(|| DsaError::missing_graph(f.to_string(), stage.kind))
    }

    fn globals_graph(&self) -> &HeapGraph {
        &self.stage().globals_graph
    }

    fn global_ecs(&self) -> &GlobalEquivalenceClasses {
        &self.stage().global_ecs
    }

    fn actual_callees(&self) -> &ActualCallees {
        &self.stage().actual_callees
    }

    /// Callees of one call instruction
    fn callees_of(&self, call: CallInstId) -> Vec<FunctionId> {
        self.actual_callees().callees(call).collect()
    }

    /// Textual dump of every graph
    fn print(&self, module: &Module) -> String {
        self.stage().print(module)
    }
}
