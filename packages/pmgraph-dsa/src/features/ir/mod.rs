//! # Program Model
//!
//! Untyped, pointer-centric IR the analysis runs on: a module of functions
//! (with or without bodies), global variables with static initializers and
//! a module-wide call index.
//!
//! Modules are built programmatically with [`ModuleBuilder`] or loaded from
//! JSON with [`Module::from_json`]; both paths validate the module.

pub mod application;
pub mod domain;

pub use application::{FunctionBuilder, ModuleBuilder};
pub use domain::{
    CallInfo, CallInstId, Callee, Function, FunctionId, GlobalId, GlobalVariable, Instruction,
    Linkage, LocalId, Module, Operand,
};
