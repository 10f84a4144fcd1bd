//! Program fixtures

use pmgraph_dsa::features::ir::{FunctionId, GlobalId, Module, ModuleBuilder, Operand};
use pmgraph_dsa::{DsaConfig, DsaPipeline, PipelineOutput};

/// `main -> f <-> g`, with `f` publishing its argument through `table`
pub struct RecursiveProgram {
    pub module: Module,
    pub main: FunctionId,
    pub f: FunctionId,
    pub g: FunctionId,
    pub table: GlobalId,
}

pub fn recursive_program() -> RecursiveProgram {
    let mut mb = ModuleBuilder::new("recursive");
    let table = mb.global("table");
    let f = mb.declare("f", 1);
    let g = mb.declare("g", 1);
    mb.define(f, |b| {
        let p = b.param(0);
        b.store(p, Operand::Global(table));
        b.call_void(g, vec![p]);
        b.ret_void();
    });
    mb.define(g, |b| {
        let p = b.param(0);
        b.call_void(f, vec![p]);
        b.ret_void();
    });
    let main = mb.function("main", 0, |b| {
        let obj = b.malloc();
        b.call_void(f, vec![obj]);
        b.ret_void();
    });
    RecursiveProgram {
        module: mb.build().expect("recursive fixture is well-formed"),
        main,
        f,
        g,
        table,
    }
}

/// `main` calls `h1` or `h2` through one function pointer; both use `shared`
pub struct HandlerProgram {
    pub module: Module,
    pub main: FunctionId,
    pub h1: FunctionId,
    pub h2: FunctionId,
    pub shared: GlobalId,
}

pub fn handler_program() -> HandlerProgram {
    let mut mb = ModuleBuilder::new("handlers");
    let shared = mb.global("shared");
    let h1 = mb.function("h1", 1, |b| {
        let p = b.param(0);
        b.store(p, Operand::Global(shared));
        b.ret_void();
    });
    let h2 = mb.function("h2", 1, |b| {
        let v = b.load(Operand::Global(shared));
        let p = b.param(0);
        b.store(v, p);
        b.ret_void();
    });
    let main = mb.function("main", 0, |b| {
        let slot = b.alloca();
        b.store(Operand::Function(h1), slot);
        b.store(Operand::Function(h2), slot);
        let fp = b.load(slot);
        let obj = b.malloc();
        b.call_indirect_void(fp, vec![obj]);
        b.ret_void();
    });
    HandlerProgram {
        module: mb.build().expect("handler fixture is well-formed"),
        main,
        h1,
        h2,
        shared,
    }
}

/// Dispatch table in a global initializer, called from a worker
///
/// `ops` holds `{ push, pop }`; `ext_log` has no body.
pub struct TableProgram {
    pub module: Module,
    pub main: FunctionId,
    pub worker: FunctionId,
    pub push: FunctionId,
    pub pop: FunctionId,
    pub ext_log: FunctionId,
    pub ops: GlobalId,
}

pub fn table_program() -> TableProgram {
    let mut mb = ModuleBuilder::new("table");
    let ext_log = mb.declare("ext_log", 1);
    let push = mb.function("push", 1, |b| {
        let p = b.param(0);
        let item = b.malloc();
        b.store(item, p);
        b.ret_void();
    });
    let pop = mb.function("pop", 1, |b| {
        let p = b.param(0);
        let item = b.load(p);
        b.call_void(ext_log, vec![item]);
        b.ret_void();
    });
    let ops = mb.global_with_init(
        "ops",
        Some(vec![(0, Operand::Function(push)), (1, Operand::Function(pop))]),
    );
    let worker = mb.function("worker", 1, |b| {
        let q = b.param(0);
        let slot = b.field(Operand::Global(ops), 1);
        let fp = b.load(slot);
        b.call_indirect_void(fp, vec![q]);
        b.ret_void();
    });
    let main = mb.function("main", 0, |b| {
        let q = b.alloca();
        b.call_void(worker, vec![q]);
        b.ret_void();
    });
    TableProgram {
        module: mb.build().expect("table fixture is well-formed"),
        main,
        worker,
        push,
        pop,
        ext_log,
        ops,
    }
}

/// Run every stage with the default configuration
pub fn run_pipeline(module: &Module) -> PipelineOutput {
    run_pipeline_with(module, DsaConfig::default())
}

pub fn run_pipeline_with(module: &Module, config: DsaConfig) -> PipelineOutput {
    DsaPipeline::new(config)
        .run(module)
        .expect("pipeline runs on a valid module")
}
