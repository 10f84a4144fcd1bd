//! Programmatic module construction
//!
//! ```rust,ignore
//! let mut mb = ModuleBuilder::new("demo");
//! let counter = mb.global("counter");
//! let f = mb.declare("f", 1);
//! mb.define(f, |b| {
//!     let p = b.param(0);
//!     b.store(p, Operand::Global(counter));
//!     b.ret_void();
//! });
//! let main = mb.function("main", 0, |b| {
//!     let obj = b.alloca();
//!     b.call_void(f, vec![obj]);
//!     b.ret_void();
//! });
//! let module = mb.build()?;
//! ```

use crate::errors::Result;
use crate::features::ir::domain::{
    CallInstId, Callee, Function, FunctionId, GlobalId, GlobalVariable, Instruction, Linkage,
    LocalId, Module, Operand,
};

/// Builds a [`Module`] with automatically assigned ids
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    functions: Vec<Function>,
    globals: Vec<GlobalVariable>,
    next_call: u32,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            next_call: 0,
        }
    }

    /// Add a global variable without initializer
    pub fn global(&mut self, name: impl Into<String>) -> GlobalId {
        self.global_with_init(name, None)
    }

    /// Add a global variable with a static initializer
    pub fn global_with_init(
        &mut self,
        name: impl Into<String>,
        initializer: Option<Vec<(u32, Operand)>>,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalVariable {
            id,
            name: name.into(),
            initializer,
        });
        id
    }

    /// Declare a function with `arity` parameters and no body yet
    pub fn declare(&mut self, name: impl Into<String>, arity: u32) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            id,
            name: name.into(),
            params: (0..arity).map(LocalId).collect(),
            body: None,
            linkage: Linkage::Internal,
            is_varargs: false,
        });
        id
    }

    /// Give a declared function its body
    pub fn define<R>(&mut self, id: FunctionId, build: impl FnOnce(&mut FunctionBuilder) -> R) -> R {
        let arity = self.functions[id.index()].params.len() as u32;
        let mut fb = FunctionBuilder {
            params: (0..arity).map(LocalId).collect(),
            next_local: arity,
            next_call: self.next_call,
            last_call: None,
            body: Vec::new(),
        };
        let result = build(&mut fb);
        self.next_call = fb.next_call;
        self.functions[id.index()].body = Some(fb.body);
        result
    }

    /// Declare and define in one step
    pub fn function(
        &mut self,
        name: impl Into<String>,
        arity: u32,
        build: impl FnOnce(&mut FunctionBuilder),
    ) -> FunctionId {
        let id = self.declare(name, arity);
        self.define(id, build);
        id
    }

    pub fn set_linkage(&mut self, id: FunctionId, linkage: Linkage) {
        self.functions[id.index()].linkage = linkage;
    }

    pub fn set_varargs(&mut self, id: FunctionId, varargs: bool) {
        self.functions[id.index()].is_varargs = varargs;
    }

    /// Validate and produce the module
    pub fn build(self) -> Result<Module> {
        Module::from_parts(self.name, self.functions, self.globals)
    }
}

/// Appends instructions to one function body
#[derive(Debug)]
pub struct FunctionBuilder {
    params: Vec<LocalId>,
    next_local: u32,
    next_call: u32,
    last_call: Option<CallInstId>,
    body: Vec<Instruction>,
}

impl FunctionBuilder {
    fn fresh(&mut self) -> LocalId {
        let id = LocalId(self.next_local);
        self.next_local += 1;
        id
    }

    fn push_def(&mut self, make: impl FnOnce(LocalId) -> Instruction) -> Operand {
        let dest = self.fresh();
        self.body.push(make(dest));
        Operand::Local(dest)
    }

    fn push_call(&mut self, dest: Option<LocalId>, callee: Callee, args: Vec<Operand>) -> CallInstId {
        let id = CallInstId(self.next_call);
        self.next_call += 1;
        self.last_call = Some(id);
        self.body.push(Instruction::Call {
            id,
            dest,
            callee,
            args,
        });
        id
    }

    /// Formal parameter `i`
    pub fn param(&self, i: usize) -> Operand {
        Operand::Local(self.params[i])
    }

    pub fn alloca(&mut self) -> Operand {
        self.push_def(|dest| Instruction::Alloca { dest })
    }

    pub fn malloc(&mut self) -> Operand {
        self.push_def(|dest| Instruction::Malloc { dest })
    }

    pub fn copy(&mut self, src: Operand) -> Operand {
        self.push_def(|dest| Instruction::Copy { dest, src })
    }

    pub fn field(&mut self, base: Operand, field: u32) -> Operand {
        self.push_def(|dest| Instruction::FieldAddr { dest, base, field })
    }

    pub fn load(&mut self, addr: Operand) -> Operand {
        self.push_def(|dest| Instruction::Load { dest, addr })
    }

    pub fn store(&mut self, value: Operand, addr: Operand) {
        self.body.push(Instruction::Store { value, addr });
    }

    pub fn int_to_ptr(&mut self) -> Operand {
        self.push_def(|dest| Instruction::IntToPtr { dest })
    }

    pub fn va_arg(&mut self) -> Operand {
        self.push_def(|dest| Instruction::VaArg { dest })
    }

    /// Direct call with a result
    pub fn call(&mut self, callee: FunctionId, args: Vec<Operand>) -> Operand {
        let dest = self.fresh();
        self.push_call(Some(dest), Callee::Direct(callee), args);
        Operand::Local(dest)
    }

    pub fn call_void(&mut self, callee: FunctionId, args: Vec<Operand>) -> CallInstId {
        self.push_call(None, Callee::Direct(callee), args)
    }

    /// Indirect call with a result
    pub fn call_indirect(&mut self, target: Operand, args: Vec<Operand>) -> Operand {
        let dest = self.fresh();
        self.push_call(Some(dest), Callee::Indirect(target), args);
        Operand::Local(dest)
    }

    pub fn call_indirect_void(&mut self, target: Operand, args: Vec<Operand>) -> CallInstId {
        self.push_call(None, Callee::Indirect(target), args)
    }

    /// Id of the most recently emitted call
    pub fn last_call(&self) -> Option<CallInstId> {
        self.last_call
    }

    pub fn ret(&mut self, value: Operand) {
        self.body.push(Instruction::Return { value: Some(value) });
    }

    pub fn ret_void(&mut self) {
        self.body.push(Instruction::Return { value: None });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_are_unique_across_functions() {
        let mut mb = ModuleBuilder::new("m");
        let leaf = mb.function("leaf", 0, |b| b.ret_void());
        let a = mb.declare("a", 0);
        let first = mb.define(a, |b| {
            let id = b.call_void(leaf, vec![]);
            b.ret_void();
            id
        });
        let b_fn = mb.declare("b", 0);
        let second = mb.define(b_fn, |b| b.call_void(leaf, vec![]));
        let module = mb.build().unwrap();

        assert_ne!(first, second);
        assert_eq!(module.call_owner(first), Some(a));
        assert_eq!(module.call_count(), 2);
    }

    #[test]
    fn test_locals_start_after_params() {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.function("f", 2, |b| {
            let obj = b.alloca();
            assert_eq!(obj, Operand::Local(LocalId(2)));
            b.ret(obj);
        });
        let module = mb.build().unwrap();
        assert_eq!(module.function(f).params, vec![LocalId(0), LocalId(1)]);
        assert_eq!(module.function(f).instructions().len(), 2);
    }

    #[test]
    fn test_declared_only_function_is_external_declaration() {
        let mut mb = ModuleBuilder::new("m");
        let ext = mb.declare("puts", 1);
        mb.set_linkage(ext, Linkage::External);
        let module = mb.build().unwrap();
        assert!(!module.function(ext).has_body());
        assert_eq!(module.defined_functions().count(), 0);
    }
}
