//! Five-stage driver
//!
//! ```text
//! Local → BottomUp → TopDown → CompleteBottomUp → EquivalenceClasses
//! ```
//!
//! Stages run to completion one after another. Only Stage 1 builds graphs
//! in parallel (feature `parallel`); everything after it mutates shared
//! graphs and runs on the calling thread.

use super::result::{PipelineOutput, PipelineStats};
use crate::config::{DsaConfig, Preset};
use crate::errors::Result;
use crate::features::data_structures::StageKind;
use crate::features::ir::Module;
use crate::features::{bottom_up, complete_bu, equiv_classes, local, top_down};
use std::time::Instant;
use tracing::info;

/// Data-structure analysis pipeline
#[derive(Debug, Clone)]
pub struct DsaPipeline {
    config: DsaConfig,
}

impl DsaPipeline {
    pub fn new(config: DsaConfig) -> Self {
        Self { config }
    }

    pub fn with_preset(preset: Preset) -> Self {
        Self::new(DsaConfig::from_preset(preset))
    }

    pub fn config(&self) -> &DsaConfig {
        &self.config
    }

    /// Run every stage over `module`
    pub fn run(&self, module: &Module) -> Result<PipelineOutput> {
        self.config.validate()?;
        let config = &self.config;
        let start = Instant::now();
        let mut stats = PipelineStats::new();

        info!(
            module = %module.name,
            functions = module.functions.len(),
            calls = module.call_count(),
            "starting data-structure analysis"
        );

        let t = Instant::now();
        let local = local::run(module, config)?;
        stats.record_stage(StageKind::Local, t.elapsed());

        let t = Instant::now();
        let bottom_up = bottom_up::run(module, &local, config)?;
        stats.record_stage(StageKind::BottomUp, t.elapsed());

        let t = Instant::now();
        let top_down = top_down::run(module, &bottom_up, config)?;
        stats.record_stage(StageKind::TopDown, t.elapsed());

        let t = Instant::now();
        let complete = complete_bu::run(module, &bottom_up, &top_down, config)?;
        stats.record_stage(StageKind::CompleteBottomUp, t.elapsed());

        let t = Instant::now();
        let equiv_classes = equiv_classes::run(module, &complete, config)?;
        stats.record_stage(StageKind::EquivalenceClasses, t.elapsed());

        stats.local = local.stats.clone();
        stats.bottom_up = bottom_up.stats.clone();
        stats.top_down = top_down.stats.clone();
        stats.complete = complete.stats.clone();
        stats.equiv_classes = equiv_classes.stats.clone();
        stats.total_duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            total_ms = stats.total_duration_ms,
            classes = stats.equiv_classes.merged_classes,
            "data-structure analysis done"
        );

        Ok(PipelineOutput {
            local,
            bottom_up,
            top_down,
            complete,
            equiv_classes,
            stats,
        })
    }

    /// Parse a JSON module and run every stage over it
    pub fn run_json(&self, json: &str) -> Result<(Module, PipelineOutput)> {
        let module = Module::from_json(json)?;
        let output = self.run(&module)?;
        Ok((module, output))
    }
}

impl Default for DsaPipeline {
    fn default() -> Self {
        Self::new(DsaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DsaError;
    use crate::features::data_structures::DataStructureInfo;
    use crate::features::ir::{ModuleBuilder, Operand};

    fn sample() -> Module {
        let mut mb = ModuleBuilder::new("sample");
        let g = mb.global("root");
        let init = mb.function("init", 0, |b| {
            let obj = b.malloc();
            b.store(obj, Operand::Global(g));
            b.ret_void();
        });
        mb.function("main", 0, |b| {
            b.call_void(init, vec![]);
            b.ret_void();
        });
        mb.build().unwrap()
    }

    #[test]
    fn test_every_stage_has_a_graph_for_main() {
        let module = sample();
        let out = DsaPipeline::default().run(&module).unwrap();
        let main = module.function_by_name("main").unwrap().id;
        for kind in StageKind::ALL {
            assert!(out.stage(kind).has_graph(main), "{} lacks main", kind);
            assert_eq!(out.stage(kind).stage_kind(), kind);
        }
        assert_eq!(out.stats.stage_durations_ms.len(), 5);
        assert_eq!(out.stats.local.functions, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let config = DsaConfig::default().max_bottom_up_revisits(0);
        let err = DsaPipeline::new(config).run(&sample()).unwrap_err();
        assert!(matches!(err, DsaError::Config(_)));
    }

    #[test]
    fn test_run_json() {
        let json = sample().to_json().unwrap();
        let (module, out) = DsaPipeline::with_preset(Preset::Fast).run_json(&json).unwrap();
        assert_eq!(out.summaries(&module).len(), 5);
    }
}
