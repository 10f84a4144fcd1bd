//! Program module: functions, globals and the call index

use super::ids::{CallInstId, FunctionId, GlobalId, LocalId};
use super::instruction::{Callee, Instruction, Operand};
use crate::errors::{DsaError, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Only callable from inside the module
    #[default]
    Internal,
    /// Visible to (and callable from) code outside the module
    External,
}

/// A function; `body == None` is an external declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    #[serde(default)]
    pub params: Vec<LocalId>,
    #[serde(default)]
    pub body: Option<Vec<Instruction>>,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub is_varargs: bool,
}

impl Function {
    #[inline]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.body.as_deref().unwrap_or(&[])
    }

    /// Call instructions of the body, in order
    pub fn calls(&self) -> impl Iterator<Item = (CallInstId, &Callee)> + '_ {
        self.instructions().iter().filter_map(Instruction::as_call)
    }
}

/// A global variable with an optional static initializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub id: GlobalId,
    pub name: String,
    /// `(field, value)` pairs stored at program start
    #[serde(default)]
    pub initializer: Option<Vec<(u32, Operand)>>,
}

/// Where a call instruction lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    pub owner: FunctionId,
    pub indirect: bool,
}

/// A whole program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub globals: Vec<GlobalVariable>,
    #[serde(skip)]
    call_index: BTreeMap<CallInstId, CallInfo>,
}

impl Module {
    /// Assemble and validate a module
    pub fn from_parts(
        name: impl Into<String>,
        functions: Vec<Function>,
        globals: Vec<GlobalVariable>,
    ) -> Result<Self> {
        let mut module = Self {
            name: name.into(),
            functions,
            globals,
            call_index: BTreeMap::new(),
        };
        module.validate()?;
        module.rebuild_call_index();
        Ok(module)
    }

    /// Parse a module from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let mut module: Module = serde_json::from_str(json)?;
        module.validate()?;
        module.rebuild_call_index();
        Ok(module)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check structural well-formedness
    ///
    /// Ids must be dense and match positions, names unique, every referenced
    /// function/global must exist and call ids must be unique module-wide.
    pub fn validate(&self) -> Result<()> {
        let mut names = FxHashSet::default();
        for (idx, func) in self.functions.iter().enumerate() {
            if func.id.index() != idx {
                return Err(DsaError::invalid_module(format!(
                    "function '{}' has id {} but sits at position {}",
                    func.name, func.id, idx
                )));
            }
            if !names.insert(func.name.as_str()) {
                return Err(DsaError::invalid_module(format!(
                    "duplicate function name '{}'",
                    func.name
                )));
            }
        }

        let mut global_names = FxHashSet::default();
        for (idx, global) in self.globals.iter().enumerate() {
            if global.id.index() != idx {
                return Err(DsaError::invalid_module(format!(
                    "global '{}' has id {} but sits at position {}",
                    global.name, global.id, idx
                )));
            }
            if !global_names.insert(global.name.as_str()) {
                return Err(DsaError::invalid_module(format!(
                    "duplicate global name '{}'",
                    global.name
                )));
            }
            for (_, op) in global.initializer.iter().flatten() {
                self.check_operand(op, &global.name)?;
            }
        }

        let mut call_ids = FxHashSet::default();
        for func in &self.functions {
            for inst in func.instructions() {
                for op in inst.operands() {
                    self.check_operand(&op, &func.name)?;
                }
                if let Instruction::Call { id, callee, .. } = inst {
                    if !call_ids.insert(*id) {
                        return Err(DsaError::invalid_module(format!(
                            "call id {} appears more than once",
                            id
                        )));
                    }
                    if let Callee::Direct(target) = callee {
                        if target.index() >= self.functions.len() {
                            return Err(DsaError::invalid_module(format!(
                                "'{}' calls unknown function {}",
                                func.name, target
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_operand(&self, op: &Operand, context: &str) -> Result<()> {
        match op {
            Operand::Function(f) if f.index() >= self.functions.len() => Err(
                DsaError::invalid_module(format!("'{}' references unknown function {}", context, f)),
            ),
            Operand::Global(g) if g.index() >= self.globals.len() => Err(
                DsaError::invalid_module(format!("'{}' references unknown global {}", context, g)),
            ),
            _ => Ok(()),
        }
    }

    fn rebuild_call_index(&mut self) {
        self.call_index = self
            .functions
            .iter()
            .flat_map(|func| {
                func.calls().map(move |(id, callee)| {
                    (
                        id,
                        CallInfo {
                            owner: func.id,
                            indirect: matches!(callee, Callee::Indirect(_)),
                        },
                    )
                })
            })
            .collect();
    }

    #[inline]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// Function lookup for ids that may come from another module
    pub fn try_function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    #[inline]
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Function that contains the call instruction
    pub fn call_owner(&self, call: CallInstId) -> Option<FunctionId> {
        self.call_index.get(&call).map(|info| info.owner)
    }

    pub fn is_indirect_call(&self, call: CallInstId) -> bool {
        self.call_index.get(&call).is_some_and(|info| info.indirect)
    }

    /// Functions with a body, in module order
    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> + '_ {
        self.functions.iter().filter(|f| f.has_body())
    }

    pub fn call_count(&self) -> usize {
        self.call_index.len()
    }
}
