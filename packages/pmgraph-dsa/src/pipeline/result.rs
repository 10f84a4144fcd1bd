//! Pipeline result types

use crate::features::bottom_up::{BottomUpGraphs, BottomUpStats};
use crate::features::complete_bu::{CompleteGraphs, CompleteStats};
use crate::features::data_structures::{DataStructureInfo, StageKind, StageSummary};
use crate::features::equiv_classes::{EquivClassGraphs, EquivClassStats};
use crate::features::ir::Module;
use crate::features::local::{LocalGraphs, LocalStats};
use crate::features::top_down::{TopDownGraphs, TopDownStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Every stage result of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub local: LocalGraphs,
    pub bottom_up: BottomUpGraphs,
    pub top_down: TopDownGraphs,
    pub complete: CompleteGraphs,
    pub equiv_classes: EquivClassGraphs,
    pub stats: PipelineStats,
}

impl PipelineOutput {
    /// Result of one stage through the query port
    pub fn stage(&self, kind: StageKind) -> &dyn DataStructureInfo {
        match kind {
            StageKind::Local => &self.local,
            StageKind::BottomUp => &self.bottom_up,
            StageKind::TopDown => &self.top_down,
            StageKind::CompleteBottomUp => &self.complete,
            StageKind::EquivalenceClasses => &self.equiv_classes,
        }
    }

    /// Serializable overview of every stage, in pipeline order
    pub fn summaries(&self, module: &Module) -> Vec<StageSummary> {
        StageKind::ALL
            .iter()
            .map(|kind| self.stage(*kind).stage().summary(module))
            .collect()
    }
}

/// Pipeline execution statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub local: LocalStats,
    pub bottom_up: BottomUpStats,
    pub top_down: TopDownStats,
    pub complete: CompleteStats,
    pub equiv_classes: EquivClassStats,

    /// Wall-clock time per stage, keyed by stage name
    pub stage_durations_ms: BTreeMap<String, f64>,

    /// Total wall-clock time
    pub total_duration_ms: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record stage duration
    pub fn record_stage(&mut self, stage: StageKind, duration: Duration) {
        self.stage_durations_ms
            .insert(stage.as_str().to_string(), duration.as_secs_f64() * 1000.0);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_stage_converts_to_millis() {
        let mut stats = PipelineStats::new();
        stats.record_stage(StageKind::TopDown, Duration::from_micros(2500));
        assert_eq!(stats.stage_durations_ms["top-down"], 2.5);
    }

    #[test]
    fn test_stats_json_has_every_stage() {
        let json = PipelineStats::new().to_json().unwrap();
        for key in ["local", "bottom_up", "top_down", "complete", "equiv_classes"] {
            assert!(json.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
    }
}
