// 🚀 Pipeline - wires readers, cleaners, merger, validator and writers
//
//   clean-entity     raw entity CSV     -> cleaned entity CSV
//   clean-indicator  raw indicator CSV  -> cleaned indicator CSV
//   merge            both cleaned CSVs  -> panel CSV + summary statistics
//   run              all three, in order
//
// Every event emitted along the way is forwarded to the caller's sink and
// stamped into the run report.

use crate::cleaning::{CleaningReport, EntityCleaner, IndicatorCleaner};
use crate::config::PipelineConfig;
use crate::data_quality::{PanelValidator, ValidationReport};
use crate::error::{PanelError, Result};
use crate::events::{EventRecord, EventSink, RecordingSink};
use crate::merge::PanelMerger;
use crate::parser::{EntityCsvReader, IndicatorCsvReader, SourceReader};
use crate::reconciliation::{IntegrityPolicy, ReconciliationResult};
use crate::stats;
use crate::writer::{self, OutputInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSelection {
    CleanEntity,
    CleanIndicator,
    Merge,
    All,
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Accounting of the cleaned entity file as loaded for the merge
    pub entity_load: CleaningReport,
    pub indicator_load: CleaningReport,
    pub reconciliation: ReconciliationResult,
    pub panel_rows: usize,
    pub matched_rows: usize,
    pub indicator_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: StageSelection,
    pub policy: IntegrityPolicy,
    pub entity_cleaning: Option<CleaningReport>,
    pub indicator_cleaning: Option<CleaningReport>,
    pub merge: Option<MergeSummary>,
    pub validation: Option<ValidationReport>,
    pub outputs: Vec<OutputInfo>,
    /// SHA-256 of the panel CSV bytes; equal across runs on unchanged inputs
    pub panel_sha256: Option<String>,
    /// Set when the run stopped on an error
    pub error: Option<String>,
    pub events: Vec<EventRecord>,
}

impl PipelineReport {
    fn new(stages: StageSelection, policy: IntegrityPolicy) -> Self {
        PipelineReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            stages,
            policy,
            entity_cleaning: None,
            indicator_cleaning: None,
            merge: None,
            validation: None,
            outputs: Vec::new(),
            panel_sha256: None,
            error: None,
            events: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn output_bytes(&self) -> u64 {
        self.outputs.iter().map(|o| o.bytes).sum()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the selected stages.
    ///
    /// On failure the partial report (with `error` set) is still written when
    /// a report path is configured, then the error is returned.
    pub fn run(&self, stages: StageSelection, sink: &mut dyn EventSink) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(stages, self.config.merge.policy);
        let mut recorder = RecordingSink::new(sink);

        let result = self.run_stages(stages, &mut report, &mut recorder);
        report.events = recorder.into_records();
        report.finished_at = Some(Utc::now());
        if let Err(e) = &result {
            report.error = Some(e.to_string());
        }

        if let Some(path) = &self.config.paths.report {
            if let Err(write_err) = report.write_json(path) {
                // A stage failure outranks a report that could not be saved
                if result.is_ok() {
                    return Err(write_err);
                }
                warn!(path = %path.display(), error = %write_err, "run report not written");
            }
        }
        result.map(|_| report)
    }

    fn run_stages(
        &self,
        stages: StageSelection,
        report: &mut PipelineReport,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let paths = &self.config.paths;
        match stages {
            StageSelection::CleanEntity => self.clean_entities(report, sink),
            StageSelection::CleanIndicator => self.clean_indicators(report, sink),
            StageSelection::Merge => self.merge(report, sink),
            StageSelection::All => {
                // Nothing is written unless both sources are present
                require_inputs(&[paths.raw_entity.as_path(), paths.raw_indicator.as_path()])?;
                self.clean_entities(report, sink)?;
                self.clean_indicators(report, sink)?;
                self.merge(report, sink)
            }
        }
    }

    fn clean_entities(&self, report: &mut PipelineReport, sink: &mut dyn EventSink) -> Result<()> {
        let paths = &self.config.paths;
        let raw = EntityCsvReader::new().read_path(&paths.raw_entity)?;
        let outcome = EntityCleaner::new(self.config.entity.clone()).clean(raw, sink)?;

        let info = writer::write_entities(&paths.clean_entity, &outcome.table, sink)?;
        report.entity_cleaning = Some(outcome.report);
        report.outputs.push(info);
        Ok(())
    }

    fn clean_indicators(&self, report: &mut PipelineReport, sink: &mut dyn EventSink) -> Result<()> {
        let paths = &self.config.paths;
        let raw = IndicatorCsvReader::new().read_path(&paths.raw_indicator)?;
        let outcome = IndicatorCleaner::new(self.config.indicator.clone()).clean(raw, sink)?;

        let info = writer::write_indicators(&paths.clean_indicator, &outcome.table, sink)?;
        report.indicator_cleaning = Some(outcome.report);
        report.outputs.push(info);
        Ok(())
    }

    fn merge(&self, report: &mut PipelineReport, sink: &mut dyn EventSink) -> Result<()> {
        let paths = &self.config.paths;
        require_inputs(&[paths.clean_entity.as_path(), paths.clean_indicator.as_path()])?;

        let entity_raw = EntityCsvReader::new().read_path(&paths.clean_entity)?;
        let entities = EntityCleaner::new(self.config.entity.clone()).load_clean(entity_raw, sink)?;
        let indicator_raw = IndicatorCsvReader::new().read_path(&paths.clean_indicator)?;
        let indicators =
            IndicatorCleaner::new(self.config.indicator.clone()).load_clean(indicator_raw, sink)?;

        let merger = PanelMerger::new(self.config.merge.policy);
        let outcome = merger.merge(entities.table, indicators.table, sink)?;
        let panel = outcome.panel;

        let validation =
            PanelValidator::new(self.config.merge.sparse_column_threshold_pct).validate(&panel, sink);

        let panel_info = writer::write_panel(&paths.panel, &panel, sink)?;
        let summary = stats::summarize_panel(&panel);
        let summary_info = writer::write_summary(&paths.summary, &summary, sink)?;

        report.merge = Some(MergeSummary {
            entity_load: entities.report,
            indicator_load: indicators.report,
            reconciliation: outcome.reconciliation,
            panel_rows: panel.len(),
            matched_rows: panel.matched_rows(),
            indicator_columns: panel.indicator_columns.clone(),
        });
        report.validation = Some(validation);
        report.panel_sha256 = Some(panel_info.sha256.clone());
        report.outputs.push(panel_info);
        report.outputs.push(summary_info);
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

fn require_inputs(paths: &[&Path]) -> Result<()> {
    match paths.iter().find(|p| !p.exists()) {
        Some(missing) => Err(PanelError::MissingInput {
            path: missing.to_path_buf(),
        }),
        None => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
