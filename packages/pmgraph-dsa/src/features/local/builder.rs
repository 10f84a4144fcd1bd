//! Intraprocedural graph construction for one function body

use crate::config::DsaConfig;
use crate::features::heap_graph::{
    CalleeRef, DsCallSite, FunctionEntry, GlobalEquivalenceClasses, GlobalValue, HeapGraph,
    NodeFlags, NodeHandle, Value,
};
use crate::features::ir::{Callee, Function, FunctionId, Instruction, LocalId, Module, Operand};

/// Builds the local graph of a single function
pub struct LocalGraphBuilder<'a> {
    module: &'a Module,
    config: &'a DsaConfig,
    func: &'a Function,
    graph: HeapGraph,
    ecs: GlobalEquivalenceClasses,
    ret: Option<NodeHandle>,
    vararg: Option<NodeHandle>,
}

impl<'a> LocalGraphBuilder<'a> {
    pub fn new(module: &'a Module, config: &'a DsaConfig, func: &'a Function) -> Self {
        Self {
            module,
            config,
            func,
            graph: HeapGraph::new(),
            ecs: GlobalEquivalenceClasses::new(),
            ret: None,
            vararg: None,
        }
    }

    /// Walk the body and return the graph with the classes it formed
    pub fn build(mut self) -> (HeapGraph, GlobalEquivalenceClasses) {
        let f = self.func.id;
        let args: Vec<NodeHandle> = self
            .func
            .params
            .iter()
            .map(|p| self.graph.scalar_or_create(Value::Local(f, *p)))
            .collect();
        if self.func.is_varargs {
            self.vararg = Some(NodeHandle::at(self.graph.add_node(NodeFlags::empty())));
        }

        for inst in self.func.instructions() {
            self.visit(inst);
        }

        let entry = FunctionEntry {
            args,
            ret: self.ret,
            vararg: self.vararg,
        };
        self.graph.set_entry(f, entry, &mut self.ecs);
        (self.graph, self.ecs)
    }

    fn local(&self, l: LocalId) -> Value {
        Value::Local(self.func.id, l)
    }

    fn operand(&mut self, op: Operand) -> Option<NodeHandle> {
        match op {
            Operand::Local(l) => Some(self.graph.scalar_or_create(self.local(l))),
            Operand::Global(g) => Some(
                self.graph
                    .global_node(GlobalValue::Variable(g), &mut self.ecs),
            ),
            Operand::Function(fid) => Some(
                self.graph
                    .global_node(GlobalValue::Function(fid), &mut self.ecs),
            ),
            Operand::Null => None,
        }
    }

    fn bind(&mut self, dest: LocalId, h: NodeHandle) {
        let v = self.local(dest);
        self.graph.bind_scalar(v, h, &mut self.ecs);
    }

    fn fresh(&mut self, dest: LocalId, flags: NodeFlags) {
        let h = NodeHandle::at(self.graph.add_node(flags));
        self.bind(dest, h);
    }

    fn vararg_node(&mut self) -> NodeHandle {
        match self.vararg {
            Some(h) => h,
            None => {
                let h = NodeHandle::at(self.graph.add_node(NodeFlags::empty()));
                self.vararg = Some(h);
                h
            }
        }
    }

    fn visit(&mut self, inst: &Instruction) {
        match inst {
            Instruction::Alloca { dest } => self.fresh(*dest, NodeFlags::ALLOCA),
            Instruction::Malloc { dest } => self.fresh(*dest, NodeFlags::HEAP),
            Instruction::IntToPtr { dest } => self.fresh(*dest, NodeFlags::UNKNOWN),

            Instruction::Copy { dest, src } => {
                if let Some(h) = self.operand(*src) {
                    self.bind(*dest, h);
                }
            }

            Instruction::FieldAddr { dest, base, field } => {
                if let Some(h) = self.operand(*base) {
                    let h = if self.config.field_sensitive {
                        self.graph.resolve(h).field(*field)
                    } else {
                        h
                    };
                    self.bind(*dest, h);
                }
            }

            Instruction::Load { dest, addr } => {
                if let Some(h) = self.operand(*addr) {
                    self.graph.add_flags(h, NodeFlags::READ);
                    let pointee = self.graph.link_or_create(h);
                    self.bind(*dest, pointee);
                }
            }

            Instruction::Store { value, addr } => {
                if let Some(h) = self.operand(*addr) {
                    self.graph.add_flags(h, NodeFlags::MODIFIED);
                    if let Some(v) = self.operand(*value) {
                        self.graph.add_link(h, v, &mut self.ecs);
                    }
                }
            }

            Instruction::Return { value } => {
                if let Some(h) = value.and_then(|op| self.operand(op)) {
                    match self.ret {
                        Some(ret) => self.graph.merge(ret, h, &mut self.ecs),
                        None => self.ret = Some(h),
                    }
                }
            }

            Instruction::VaArg { dest } => {
                let va = self.vararg_node();
                self.graph.add_flags(va, NodeFlags::READ);
                self.bind(*dest, va);
            }

            Instruction::Call {
                id,
                dest,
                callee,
                args,
            } => self.visit_call(*id, *dest, callee, args),
        }
    }

    fn visit_call(
        &mut self,
        id: crate::features::ir::CallInstId,
        dest: Option<LocalId>,
        callee: &Callee,
        args: &[Operand],
    ) {
        if let Callee::Direct(target) = callee {
            let target_fn = self.module.function(*target);
            if !target_fn.has_body() {
                if self.config.is_allocator(&target_fn.name) {
                    if let Some(dest) = dest {
                        self.fresh(dest, NodeFlags::HEAP);
                    }
                    return;
                }
                if self.config.is_deallocator(&target_fn.name) {
                    return;
                }
            }
        }

        let callee = match callee {
            Callee::Direct(target) => CalleeRef::Direct(*target),
            Callee::Indirect(op) => {
                let h = match self.operand(*op) {
                    Some(h) => h,
                    None => NodeHandle::at(self.graph.add_node(NodeFlags::empty())),
                };
                CalleeRef::Indirect(h)
            }
        };
        let args = args.iter().map(|a| self.operand(*a)).collect();
        let ret = dest.map(|d| self.graph.scalar_or_create(self.local(d)));

        let cs = DsCallSite {
            call: id,
            caller: self.func.id,
            callee,
            ret,
            args,
        };
        self.graph.function_calls_mut().push(cs.clone());
        self.graph.aux_calls_mut().push(cs);
    }
}

/// Convenience wrapper used by the stage driver and tests
pub fn build_local_graph(
    module: &Module,
    config: &DsaConfig,
    f: FunctionId,
) -> (HeapGraph, GlobalEquivalenceClasses) {
    LocalGraphBuilder::new(module, config, module.function(f)).build()
}
