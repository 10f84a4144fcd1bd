//! Instructions of the pointer-centric IR
//!
//! The IR is untyped: every value is treated as a potential pointer, and only
//! the operations that move pointers around are modelled.

use super::ids::{CallInstId, FunctionId, GlobalId, LocalId};
use serde::{Deserialize, Serialize};

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Local(LocalId),
    /// Address of a global variable
    Global(GlobalId),
    /// Address of a function
    Function(FunctionId),
    Null,
}

impl Operand {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Null)
    }
}

/// Call target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Direct(FunctionId),
    /// Call through a function pointer
    Indirect(Operand),
}

/// One instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Stack object
    Alloca { dest: LocalId },

    /// Heap object from an allocation site that is not a call
    Malloc { dest: LocalId },

    /// Pointer copy (cast, phi, select)
    Copy { dest: LocalId, src: Operand },

    /// Address of field `field` inside the object `base` points into
    FieldAddr {
        dest: LocalId,
        base: Operand,
        field: u32,
    },

    Load { dest: LocalId, addr: Operand },

    Store { value: Operand, addr: Operand },

    Call {
        id: CallInstId,
        dest: Option<LocalId>,
        callee: Callee,
        args: Vec<Operand>,
    },

    Return { value: Option<Operand> },

    /// Pointer forged from an integer
    IntToPtr { dest: LocalId },

    /// Read of the next variable argument
    VaArg { dest: LocalId },
}

impl Instruction {
    /// Call id and callee, if this is a call
    pub fn as_call(&self) -> Option<(CallInstId, &Callee)> {
        match self {
            Instruction::Call { id, callee, .. } => Some((*id, callee)),
            _ => None,
        }
    }

    /// Local defined by this instruction
    pub fn dest(&self) -> Option<LocalId> {
        match self {
            Instruction::Alloca { dest }
            | Instruction::Malloc { dest }
            | Instruction::Copy { dest, .. }
            | Instruction::FieldAddr { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::IntToPtr { dest }
            | Instruction::VaArg { dest } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } | Instruction::Return { .. } => None,
        }
    }

    /// All operands read by this instruction
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instruction::Copy { src, .. } => vec![*src],
            Instruction::FieldAddr { base, .. } => vec![*base],
            Instruction::Load { addr, .. } => vec![*addr],
            Instruction::Store { value, addr } => vec![*value, *addr],
            Instruction::Call { callee, args, .. } => {
                let mut ops = args.clone();
                if let Callee::Indirect(target) = callee {
                    ops.push(*target);
                }
                ops
            }
            Instruction::Return { value } => value.iter().copied().collect(),
            Instruction::Alloca { .. }
            | Instruction::Malloc { .. }
            | Instruction::IntToPtr { .. }
            | Instruction::VaArg { .. } => Vec::new(),
        }
    }
}
