//! Textual dumps and JSON summaries of stage results

mod common;

use common::*;
use pmgraph_dsa::features::data_structures::StageSummary;
use pmgraph_dsa::{DataStructureInfo, DsaConfig, StageKind};
use pretty_assertions::assert_eq;

#[test]
fn test_sequential_and_parallel_local_builds_agree() {
    let p = table_program();
    let parallel = run_pipeline_with(&p.module, DsaConfig::default().parallel_local(true));
    let sequential = run_pipeline_with(&p.module, DsaConfig::default().parallel_local(false));

    for kind in StageKind::ALL {
        assert_eq!(
            parallel.stage(kind).print(&p.module),
            sequential.stage(kind).print(&p.module)
        );
    }
}

#[test]
fn test_repeated_runs_print_identically() {
    let p = recursive_program();
    let first = run_pipeline(&p.module);
    let second = run_pipeline(&p.module);
    assert_eq!(
        first.equiv_classes.print(&p.module),
        second.equiv_classes.print(&p.module)
    );
    assert_eq!(first.stats.equiv_classes, second.stats.equiv_classes);
}

#[test]
fn test_dump_names_merged_functions_and_globals() {
    let p = handler_program();
    let out = run_pipeline(&p.module);

    let dump = out.equiv_classes.print(&p.module);
    assert!(dump.starts_with("=== equivalence-class data structures ==="));
    assert!(dump.contains("graph [h1, h2]"), "{}", dump);
    assert!(dump.contains("@shared"));
    assert!(dump.contains("entry h1("));
    assert!(dump.contains("entry h2("));

    let local = out.local.print(&p.module);
    assert!(local.contains("graph [h1]"));
    assert!(local.contains("graph [h2]"));
    assert!(!local.contains("graph [h1, h2]"));
}

#[test]
fn test_stage_summary_survives_json() {
    let p = recursive_program();
    let out = run_pipeline(&p.module);

    let summary = out.complete.stage().summary(&p.module);
    let json = serde_json::to_string(&summary).unwrap();
    let back: StageSummary = serde_json::from_str(&json).unwrap();

    assert_eq!(back.stage, StageKind::CompleteBottomUp);
    assert_eq!(back.graphs, summary.graphs);
    assert_eq!(back.actual_callees, summary.actual_callees);

    let merged = back
        .graphs
        .iter()
        .find(|g| g.functions.len() == 2)
        .expect("f and g share a graph");
    assert_eq!(merged.functions, vec!["f".to_string(), "g".to_string()]);
}

#[test]
fn test_pipeline_stats_serialize_with_durations() {
    let p = handler_program();
    let out = run_pipeline(&p.module);

    let json = out.stats.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let durations = value["stage_durations_ms"].as_object().unwrap();
    assert_eq!(durations.len(), 5);
    assert!(durations.contains_key("equivalence-class"));
    assert_eq!(value["equiv_classes"]["merged_classes"], 1);
}
