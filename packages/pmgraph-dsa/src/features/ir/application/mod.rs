pub mod builder;

pub use builder::{FunctionBuilder, ModuleBuilder};
