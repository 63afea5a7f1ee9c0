// 📣 Pipeline events - the only way the core reports progress
//
// Cleaners, the merger and the validator never print. They emit typed events
// into an `EventSink`; the caller decides how to render them (tracing logs in
// the CLI, an in-memory list in tests and in the run report).

use crate::cleaning::DropReason;
use crate::stats::ColumnSummary;
use crate::temporal::DateRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// STAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    EntityCleaning,
    IndicatorCleaning,
    Merge,
    Validation,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::EntityCleaning => "entity_cleaning",
            Stage::IndicatorCleaning => "indicator_cleaning",
            Stage::Merge => "merge",
            Stage::Validation => "validation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    SourceLoaded {
        stage: Stage,
        source: String,
        rows: usize,
        columns: Vec<String>,
    },
    RowsDropped {
        stage: Stage,
        reason: DropReason,
        count: usize,
    },
    StageCompleted {
        stage: Stage,
        input_rows: usize,
        output_rows: usize,
    },
    EntitySummary {
        unique_entities: usize,
        observations: usize,
        date_range: Option<DateRange>,
        ptype_counts: BTreeMap<String, usize>,
        usdret: ColumnSummary,
        market_equity: ColumnSummary,
    },
    MonthsInserted {
        count: usize,
    },
    GapFilled {
        column: String,
        filled: usize,
    },
    DerivedColumn {
        name: String,
        source: String,
        rows_without_history: usize,
    },
    Aligned {
        table: String,
        realigned: usize,
    },
    MergeCompleted {
        entity_rows: usize,
        indicator_rows: usize,
        panel_rows: usize,
        matched_rows: usize,
        unmatched_rows: usize,
    },
    IntegrityCheck {
        check: String,
        passed: bool,
        detail: String,
    },
    MissingValues {
        column: String,
        count: usize,
        pct: f64,
    },
    Coverage {
        unique_entities: usize,
        unique_months: usize,
        balanced_size: usize,
        actual_rows: usize,
        imbalance: i64,
    },
    Warning {
        stage: Stage,
        message: String,
    },
    OutputWritten {
        path: String,
        rows: usize,
        columns: usize,
        bytes: u64,
    },
}

/// An event stamped with identity and time, as kept in the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

impl EventRecord {
    pub fn new(event: PipelineEvent) -> Self {
        EventRecord {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

// ============================================================================
// SINKS
// ============================================================================

pub trait EventSink {
    fn emit(&mut self, event: PipelineEvent);
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: PipelineEvent) {}
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<PipelineEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Warning { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn dropped(&self, stage: Stage, reason: DropReason) -> usize {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::RowsDropped {
                    stage: s,
                    reason: r,
                    count,
                } if *s == stage && *r == reason => Some(*count),
                _ => None,
            })
            .sum()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: PipelineEvent) {
        self.events.push(event);
    }
}

/// Forwards to another sink and keeps a stamped copy of every event
pub struct RecordingSink<'a> {
    inner: &'a mut dyn EventSink,
    records: Vec<EventRecord>,
}

impl<'a> RecordingSink<'a> {
    pub fn new(inner: &'a mut dyn EventSink) -> Self {
        RecordingSink {
            inner,
            records: Vec::new(),
        }
    }

    pub fn into_records(self) -> Vec<EventRecord> {
        self.records
    }
}

impl EventSink for RecordingSink<'_> {
    fn emit(&mut self, event: PipelineEvent) {
        self.records.push(EventRecord::new(event.clone()));
        self.inner.emit(event);
    }
}

/// Renders events as structured `tracing` records
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::SourceLoaded {
                stage,
                source,
                rows,
                columns,
            } => info!(%stage, %source, rows, columns = columns.len(), "source loaded"),
            PipelineEvent::RowsDropped {
                stage,
                reason,
                count,
            } => warn!(%stage, reason = reason.name(), count, "rows dropped"),
            PipelineEvent::StageCompleted {
                stage,
                input_rows,
                output_rows,
            } => info!(
                %stage,
                input_rows,
                output_rows,
                removed = input_rows as i64 - output_rows as i64,
                "stage completed"
            ),
            PipelineEvent::EntitySummary {
                unique_entities,
                observations,
                date_range,
                ptype_counts,
                usdret,
                market_equity,
            } => {
                let range = date_range.map(|r| r.to_string()).unwrap_or_default();
                let months = date_range.map_or(0, |r| r.month_span());
                info!(unique_entities, observations, date_range = %range, months, "entity panel summary");
                for (column, summary) in [("usdret", usdret), ("market_equity", market_equity)] {
                    info!(
                        %column,
                        count = summary.count,
                        mean = ?summary.mean,
                        std = ?summary.std,
                        min = ?summary.min,
                        median = ?summary.q50,
                        max = ?summary.max,
                        "column summary"
                    );
                }
                for (ptype, count) in ptype_counts {
                    debug!(%ptype, count, "property type");
                }
            }
            PipelineEvent::MonthsInserted { count } => {
                info!(count, "calendar months inserted into indicator series")
            }
            PipelineEvent::GapFilled { column, filled } => {
                info!(%column, filled, "forward-filled short gaps")
            }
            PipelineEvent::DerivedColumn {
                name,
                source,
                rows_without_history,
            } => info!(%name, %source, rows_without_history, "derived column created"),
            PipelineEvent::Aligned { table, realigned } => {
                info!(%table, realigned, "dates aligned to month-end")
            }
            PipelineEvent::MergeCompleted {
                entity_rows,
                indicator_rows,
                panel_rows,
                matched_rows,
                unmatched_rows,
            } => info!(
                entity_rows,
                indicator_rows, panel_rows, matched_rows, unmatched_rows, "merge completed"
            ),
            PipelineEvent::IntegrityCheck {
                check,
                passed,
                detail,
            } => {
                if passed {
                    info!(%check, %detail, "integrity check passed");
                } else {
                    warn!(%check, %detail, "integrity check failed");
                }
            }
            PipelineEvent::MissingValues { column, count, pct } => {
                info!(%column, count, pct = %format!("{:.1}", pct), "missing values")
            }
            PipelineEvent::Coverage {
                unique_entities,
                unique_months,
                balanced_size,
                actual_rows,
                imbalance,
            } => info!(
                unique_entities,
                unique_months, balanced_size, actual_rows, imbalance, "entity coverage"
            ),
            PipelineEvent::Warning { stage, message } => warn!(%stage, "{}", message),
            PipelineEvent::OutputWritten {
                path,
                rows,
                columns,
                bytes,
            } => info!(
                %path,
                rows,
                columns,
                size_mb = %format!("{:.2}", bytes as f64 / (1024.0 * 1024.0)),
                "output written"
            ),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
