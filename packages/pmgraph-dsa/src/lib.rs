/*
 * pmgraph-dsa - Interprocedural Data-Structure Analysis
 *
 * Feature-First Architecture:
 * - shared/    : Union-find utilities
 * - features/  : Program model, heap graphs and the five analysis stages
 * - pipeline/  : Stage orchestration
 * - config/    : Presets, YAML config, validation
 *
 * Stages:
 *   Local → BottomUp → TopDown → CompleteBottomUp → EquivalenceClasses
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Merge routines thread graphs, flags and ECs
#![allow(clippy::type_complexity)] // Graph/index pairs returned together
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional
#![allow(clippy::needless_range_loop)] // Range loop for indexing parallel arrays

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared utilities (union-find)
pub mod shared;

/// Feature modules (program model, heap graphs, analysis stages)
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{DsaConfig, Preset};
pub use errors::{DsaError, Result};
pub use pipeline::{DsaPipeline, PipelineOutput, PipelineStats};

pub use features::bottom_up::BottomUpGraphs;
pub use features::call_graph::CallGraphView;
pub use features::complete_bu::CompleteGraphs;
pub use features::data_structures::{DataStructureInfo, StageKind};
pub use features::equiv_classes::EquivClassGraphs;
pub use features::heap_graph::HeapGraph;
pub use features::ir::{FunctionId, Module, ModuleBuilder};
pub use features::local::LocalGraphs;
pub use features::top_down::TopDownGraphs;
