pub mod ids;
pub mod instruction;
pub mod module;

pub use ids::{CallInstId, FunctionId, GlobalId, LocalId};
pub use instruction::{Callee, Instruction, Operand};
pub use module::{CallInfo, Function, GlobalVariable, Linkage, Module};
