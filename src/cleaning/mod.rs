// 🧹 Cleaners - field-level validation passes over the two raw sources
//
// Both cleaners follow the same contract: a row that fails a required-field or
// parse check is dropped and counted under a `DropReason`. Nothing is repaired
// by substituting a made-up value.

pub mod entity;
pub mod indicator;

pub use entity::EntityCleaner;
pub use indicator::IndicatorCleaner;

use crate::events::{EventSink, PipelineEvent, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// DROP REASONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The CSV record itself could not be read
    MalformedRecord,
    MissingTicker,
    MissingDate,
    MissingReturn,
    InvalidDate,
    InvalidReturn,
    /// Return outside the configured [min, max] bounds
    ReturnOutOfRange,
    /// Key already seen; first occurrence kept
    DuplicateKey,
    /// Indicator cell that is empty or not a number in an already-cleaned table
    InvalidValue,
    /// Several source rows folded into one calendar month
    SameMonthConsolidated,
    /// Indicator gap longer than the forward-fill limit
    UnfilledGap,
    /// Not enough trailing months for a derived field
    InsufficientHistory,
}

impl DropReason {
    pub fn name(&self) -> &str {
        match self {
            DropReason::MalformedRecord => "malformed_record",
            DropReason::MissingTicker => "missing_ticker",
            DropReason::MissingDate => "missing_date",
            DropReason::MissingReturn => "missing_return",
            DropReason::InvalidDate => "invalid_date",
            DropReason::InvalidReturn => "invalid_return",
            DropReason::ReturnOutOfRange => "return_out_of_range",
            DropReason::DuplicateKey => "duplicate_key",
            DropReason::InvalidValue => "invalid_value",
            DropReason::SameMonthConsolidated => "same_month_consolidated",
            DropReason::UnfilledGap => "unfilled_gap",
            DropReason::InsufficientHistory => "insufficient_history",
        }
    }
}

// ============================================================================
// CLEANING REPORT
// ============================================================================

/// Row accounting for one cleaning stage:
/// `output_rows == input_rows - total_dropped() + synthesized_rows`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub stage: Stage,
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows created by the stage itself (calendar months inserted before gap filling)
    pub synthesized_rows: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl CleaningReport {
    pub fn new(stage: Stage, input_rows: usize) -> Self {
        CleaningReport {
            stage,
            input_rows,
            output_rows: 0,
            synthesized_rows: 0,
            dropped: BTreeMap::new(),
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        self.record_drops(reason, 1);
    }

    pub fn record_drops(&mut self, reason: DropReason, count: usize) {
        if count > 0 {
            *self.dropped.entry(reason).or_insert(0) += count;
        }
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    /// True when the row accounting adds up
    pub fn is_consistent(&self) -> bool {
        self.input_rows + self.synthesized_rows == self.output_rows + self.total_dropped()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows in, {} rows out, {} removed",
            self.stage,
            self.input_rows,
            self.output_rows,
            self.total_dropped()
        )
    }

    /// Emit one event per drop reason plus the completion event
    pub fn emit(&self, sink: &mut dyn EventSink) {
        for (reason, count) in &self.dropped {
            sink.emit(PipelineEvent::RowsDropped {
                stage: self.stage,
                reason: *reason,
                count: *count,
            });
        }
        sink.emit(PipelineEvent::StageCompleted {
            stage: self.stage,
            input_rows: self.input_rows,
            output_rows: self.output_rows,
        });
    }
}

/// Cleaned table plus its accounting
#[derive(Debug, Clone)]
pub struct CleaningOutcome<T> {
    pub table: T,
    pub report: CleaningReport,
}

// ============================================================================
// CELL COERCION
// ============================================================================

/// Trimmed non-empty text, or None
pub(crate) fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Finite number, or None for empty / unparseable / NaN / infinite cells
pub(crate) fn parse_number(raw: Option<&str>) -> Option<f64> {
    non_empty(raw)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================
