//! Textual dump and serializable summary of a graph

use super::graph::HeapGraph;
use crate::features::heap_graph::domain::{CalleeRef, DsCallSite, GlobalValue, NodeHandle, Value};
use crate::features::ir::Module;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Per-node summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: u32,
    pub flags: Vec<String>,
    pub globals: Vec<String>,
    pub links: Vec<(u32, String)>,
}

/// Serializable overview of one graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub functions: Vec<String>,
    pub node_count: usize,
    pub incomplete_count: usize,
    pub call_count: usize,
    pub aux_call_count: usize,
    pub nodes: Vec<NodeSummary>,
}

impl HeapGraph {
    pub fn summary(&self, module: &Module) -> GraphSummary {
        let nodes = self
            .node_ids()
            .map(|id| {
                let node = self.node(id);
                NodeSummary {
                    id: id.0,
                    flags: node.flags.names().into_iter().map(str::to_string).collect(),
                    globals: node.globals.iter().map(|gv| global_name(module, *gv)).collect(),
                    links: self
                        .links_of(id)
                        .into_iter()
                        .map(|(off, target)| (off, target.to_string()))
                        .collect(),
                }
            })
            .collect();

        GraphSummary {
            functions: self
                .represented_functions()
                .map(|f| module.function(f).name.clone())
                .collect(),
            node_count: self.node_count(),
            incomplete_count: self.incomplete_nodes().len(),
            call_count: self.function_calls().len(),
            aux_call_count: self.aux_calls().len(),
            nodes,
        }
    }

    /// Human-readable dump
    pub fn print(&self, module: &Module) -> String {
        let mut out = String::new();
        let names: Vec<&str> = self
            .represented_functions()
            .map(|f| module.function(f).name.as_str())
            .collect();
        let _ = writeln!(out, "graph [{}]", names.join(", "));

        for id in self.node_ids() {
            let node = self.node(id);
            let _ = write!(out, "  {} <{}>", id, node.flags);
            if !node.globals.is_empty() {
                let globals: Vec<String> =
                    node.globals.iter().map(|gv| global_name(module, *gv)).collect();
                let _ = write!(out, " {{{}}}", globals.join(", "));
            }
            for (off, target) in self.links_of(id) {
                let _ = write!(out, " [{}]->{}", off, target);
            }
            out.push('\n');
        }

        for (v, h) in self.scalar_entries() {
            let _ = writeln!(out, "  {} = {}", value_name(module, v), h);
        }

        for (f, entry) in self.entries() {
            let args: Vec<String> = entry.args.iter().map(|h| self.resolve(*h).to_string()).collect();
            let _ = write!(out, "  entry {}({})", module.function(f).name, args.join(", "));
            if let Some(ret) = entry.ret {
                let _ = write!(out, " -> {}", self.resolve(ret));
            }
            if let Some(va) = entry.vararg {
                let _ = write!(out, " ... {}", self.resolve(va));
            }
            out.push('\n');
        }

        for cs in self.function_calls() {
            let _ = writeln!(out, "  call {}", self.call_text(module, cs));
        }
        for cs in self.aux_calls() {
            let _ = writeln!(out, "  aux  {}", self.call_text(module, cs));
        }
        out
    }

    fn call_text(&self, module: &Module, cs: &DsCallSite) -> String {
        let callee = match cs.callee {
            CalleeRef::Direct(f) => module.function(f).name.clone(),
            CalleeRef::Indirect(h) => format!("*{}", self.resolve(h)),
        };
        let show = |h: Option<NodeHandle>| match h {
            Some(h) => self.resolve(h).to_string(),
            None => "null".to_string(),
        };
        let args: Vec<String> = cs.args.iter().map(|a| show(*a)).collect();
        format!("{} {}({}) -> {}", cs.call, callee, args.join(", "), show(cs.ret))
    }
}

fn global_name(module: &Module, gv: GlobalValue) -> String {
    match gv {
        GlobalValue::Variable(g) => format!("@{}", module.global(g).name),
        GlobalValue::Function(f) => format!("&{}", module.function(f).name),
    }
}

fn value_name(module: &Module, v: Value) -> String {
    match v {
        Value::Local(f, l) => format!("{}:{}", module.function(f).name, l),
        Value::Global(gv) => global_name(module, gv),
    }
}
