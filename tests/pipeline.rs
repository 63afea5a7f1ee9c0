// End-to-end runs of the pipeline over scratch directories

use panel_merge::{
    DropReason, IntegrityPolicy, LagConfig, MemorySink, PanelError, PathConfig, Pipeline,
    PipelineConfig, PipelineEvent, StageSelection,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config_in(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        paths: PathConfig {
            raw_entity: dir.join("data/raw/entity.csv"),
            raw_indicator: dir.join("data/raw/indicator.csv"),
            clean_entity: dir.join("data/processed/entity_clean.csv"),
            clean_indicator: dir.join("data/processed/indicator_clean.csv"),
            panel: dir.join("data/final/panel.csv"),
            summary: dir.join("data/final/summary.csv"),
            report: None,
        },
        ..Default::default()
    };
    config.indicator.yoy = None;
    config.indicator.lags = Some(LagConfig {
        source: "FEDFUNDS".to_string(),
        periods: vec![1],
    });
    config
}

const RAW_ENTITY: &str = "\
ticker,date,usdret,ptype
aaa,2020-02-29,0.03,Office
AAA,2020-03-31,0.01,Office
BBB,2020-02-15,-0.02,Retail
AAA,2020-05-31,0.02,Office
,2020-02-29,0.04,Office
CCC,2020-02-29,7.0,Retail
AAA,2020-02-10,0.09,Office
";

const RAW_INDICATOR: &str = "\
date,FEDFUNDS
2020-01-01,1.55
2020-02-01,1.58
2020-03-01,0.65
2020-04-01,0.05
";

fn seed_raw(config: &PipelineConfig) {
    write(&config.paths.raw_entity, RAW_ENTITY);
    write(&config.paths.raw_indicator, RAW_INDICATOR);
}

// ============================================================================
// FULL RUN
// ============================================================================

#[test]
fn test_full_run_writes_panel_and_summary() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    seed_raw(&config);

    let mut sink = MemorySink::new();
    let report = Pipeline::new(config.clone())
        .run(StageSelection::All, &mut sink)
        .unwrap();

    // Entity cleaning accounting
    let entity = report.entity_cleaning.as_ref().unwrap();
    assert_eq!(entity.input_rows, 7);
    assert_eq!(entity.output_rows, 4);
    assert_eq!(entity.count(DropReason::MissingTicker), 1);
    assert_eq!(entity.count(DropReason::ReturnOutOfRange), 1);
    assert_eq!(entity.count(DropReason::DuplicateKey), 1);
    assert!(entity.is_consistent());

    // January has no prior month for the lag
    let indicator = report.indicator_cleaning.as_ref().unwrap();
    assert_eq!(indicator.count(DropReason::InsufficientHistory), 1);
    assert_eq!(indicator.output_rows, 3);

    let merge = report.merge.as_ref().unwrap();
    assert!(merge.reconciliation.is_balanced());
    assert_eq!(merge.panel_rows, 4);
    assert_eq!(merge.matched_rows, 3);

    let panel = fs::read_to_string(&config.paths.panel).unwrap();
    let lines: Vec<&str> = panel.lines().collect();
    assert_eq!(
        lines,
        vec![
            "ticker,date,usdret,market_equity,ptype,assets,sales,net_income,book_equity,debt_at,FEDFUNDS,FEDFUNDS_lag1",
            "AAA,2020-02-29,0.03,,Office,,,,,,1.58,1.55",
            "AAA,2020-03-31,0.01,,Office,,,,,,0.65,1.58",
            "AAA,2020-05-31,0.02,,Office,,,,,,,",
            "BBB,2020-02-29,-0.02,,Retail,,,,,,1.58,1.55",
        ]
    );

    let summary = fs::read_to_string(&config.paths.summary).unwrap();
    let summary_lines: Vec<&str> = summary.lines().collect();
    assert_eq!(
        summary_lines[0],
        ",usdret,market_equity,assets,sales,net_income,book_equity,debt_at,FEDFUNDS,FEDFUNDS_lag1"
    );
    assert_eq!(summary_lines[1], "count,4,0,0,0,0,0,0,3,3");
    let stat_names: Vec<&str> = summary_lines
        .iter()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(stat_names, vec!["count", "mean", "std", "min", "25%", "50%", "75%", "max"]);

    let validation = report.validation.as_ref().unwrap();
    assert_eq!(validation.coverage.unique_entities, 2);
    assert_eq!(validation.coverage.unique_months, 3);
    assert_eq!(validation.coverage.imbalance, 2);
    assert_eq!(validation.coverage.unmatched_rows, 1);

    assert_eq!(report.outputs.len(), 4);
    assert!(report.succeeded());
    assert_eq!(report.events.len(), sink.events.len());
}

#[test]
fn test_rerun_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    seed_raw(&config);
    let pipeline = Pipeline::new(config.clone());

    let first = pipeline.run(StageSelection::All, &mut MemorySink::new()).unwrap();
    let first_bytes = fs::read(&config.paths.panel).unwrap();
    let second = pipeline.run(StageSelection::All, &mut MemorySink::new()).unwrap();
    let second_bytes = fs::read(&config.paths.panel).unwrap();

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first.panel_sha256, second.panel_sha256);
    assert!(first.panel_sha256.is_some());
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_run_report_written_as_json() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.paths.report = Some(dir.path().join("data/final/run.json"));
    seed_raw(&config);

    let report = Pipeline::new(config.clone())
        .run(StageSelection::All, &mut MemorySink::new())
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.paths.report.unwrap()).unwrap()).unwrap();
    assert_eq!(json["run_id"], report.run_id.as_str());
    assert_eq!(json["policy"], "strict");
    assert_eq!(json["merge"]["reconciliation"]["status"], "balanced");
    assert_eq!(json["panel_sha256"], report.panel_sha256.unwrap().as_str());
    assert!(json["events"].as_array().unwrap().len() > 5);
    assert!(json["error"].is_null());
}

// ============================================================================
// MERGE STAGE ON CLEANED FILES
// ============================================================================

fn seed_clean(config: &PipelineConfig, entity: &str, indicator: &str) {
    write(&config.paths.clean_entity, entity);
    write(&config.paths.clean_indicator, indicator);
}

#[test]
fn test_merge_literal_scenario() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    seed_clean(
        &config,
        "ticker,date,usdret\nAAA,2020-01-31,0.05\nAAA,2020-02-29,0.03\nBBB,2020-01-31,-0.02\n",
        "date,rate\n2020-01-31,1.5\n2020-02-29,1.6\n",
    );

    let report = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut MemorySink::new())
        .unwrap();

    let panel = fs::read_to_string(&config.paths.panel).unwrap();
    let rates: Vec<&str> = panel
        .lines()
        .skip(1)
        .map(|l| l.rsplit(',').next().unwrap())
        .collect();
    assert_eq!(rates, vec!["1.5", "1.6", "1.5"]);

    assert!(report.merge.unwrap().reconciliation.is_balanced());
    let coverage = report.validation.unwrap().coverage;
    assert_eq!(coverage.balanced_size, 4);
    assert_eq!(coverage.actual_rows, 3);
    assert_eq!(coverage.imbalance, 1);
}

#[test]
fn test_merge_keeps_month_missing_from_indicators() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    seed_clean(
        &config,
        "ticker,date,usdret\nAAA,2020-02-29,0.01\nAAA,2020-03-31,0.02\n",
        "date,FEDFUNDS,UNRATE\n2020-02-29,1.58,3.5\n2020-04-30,0.05,14.7\n",
    );

    let report = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut MemorySink::new())
        .unwrap();

    let panel = fs::read_to_string(&config.paths.panel).unwrap();
    assert!(panel.lines().any(|l| l == "AAA,2020-03-31,0.02,,,,,,,,,"));
    let validation = report.validation.unwrap();
    assert_eq!(validation.coverage.unmatched_months.len(), 1);
    assert_eq!(validation.missing_for("UNRATE").unwrap().count, 1);
}

const DUPLICATE_MONTHS: &str = "date,rate\n2020-01-31,1.5\n2020-01-31,1.7\n";

#[test]
fn test_duplicate_indicator_month_rejected_under_strict() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    seed_clean(&config, "ticker,date,usdret\nAAA,2020-01-31,0.05\n", DUPLICATE_MONTHS);

    let err = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut MemorySink::new())
        .unwrap_err();

    assert!(matches!(err, PanelError::IntegrityViolation { .. }));
    assert!(!config.paths.panel.exists());
}

#[test]
fn test_duplicate_indicator_month_warned_under_lenient() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.merge.policy = IntegrityPolicy::Warn;
    seed_clean(&config, "ticker,date,usdret\nAAA,2020-01-31,0.05\n", DUPLICATE_MONTHS);

    let mut sink = MemorySink::new();
    let report = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut sink)
        .unwrap();

    assert_eq!(report.merge.unwrap().panel_rows, 1);
    let panel = fs::read_to_string(&config.paths.panel).unwrap();
    assert_eq!(panel.lines().count(), 2);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        PipelineEvent::IntegrityCheck { check, passed: false, .. } if check == "unique_indicator_months"
    )));
}

#[test]
fn test_indicator_column_clashing_with_entity_column_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.merge.policy = IntegrityPolicy::Warn;
    seed_clean(
        &config,
        "ticker,date,usdret\nAAA,2020-01-31,0.05\n",
        "date,usdret\n2020-01-31,9.9\n",
    );

    let err = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut MemorySink::new())
        .unwrap_err();

    assert!(matches!(err, PanelError::Schema { .. }));
    assert!(!config.paths.panel.exists());
}

#[test]
fn test_missing_cleaned_input() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write(&config.paths.clean_entity, "ticker,date,usdret\nAAA,2020-01-31,0.05\n");

    let err = Pipeline::new(config.clone())
        .run(StageSelection::Merge, &mut MemorySink::new())
        .unwrap_err();

    assert!(err.is_recoverable());
    assert!(matches!(err, PanelError::MissingInput { ref path } if *path == config.paths.clean_indicator));
    assert!(!config.paths.panel.exists());
}

#[test]
fn test_config_file_drives_policy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("panel.json");
    write(
        &path,
        r#"{ "merge": { "policy": "warn", "sparse_column_threshold_pct": 80.0 }, "indicator": { "ffill_limit": 1 } }"#,
    );

    let config = PipelineConfig::from_file(&path).unwrap();
    assert_eq!(config.merge.policy, IntegrityPolicy::Warn);
    assert_eq!(config.merge.sparse_column_threshold_pct, 80.0);
    assert_eq!(config.indicator.ffill_limit, 1);
    assert_eq!(config.paths, PathConfig::default());
}
