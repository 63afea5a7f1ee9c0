// 🔗 Panel Merger - left join of entity-months onto the monthly indicator table
//
// Pipeline:
//   0. Column names: the panel header is the union of both schemas
//   1. Align both tables to month-end dates
//   2. Cardinality guards (unique indicator months, unique entity keys)
//   3. Key-indexed left join (HashMap<month, row>, one pass over entities)
//   4. Row-count reconciliation
//   5. Canonical sort by (ticker, month)

use crate::deduplication::find_duplicates;
use crate::error::{PanelError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::reconciliation::{IntegrityPolicy, ReconciliationEngine, ReconciliationResult};
use crate::schema::{
    entity_schema, indicator_schema, EntityObservation, IndicatorTable, Panel, PanelRow,
};
use crate::temporal;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Duplicate keys listed in a violation message
const MAX_LISTED_KEYS: usize = 5;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub panel: Panel,
    pub reconciliation: ReconciliationResult,
}

pub struct PanelMerger {
    engine: ReconciliationEngine,
}

impl PanelMerger {
    pub fn new(policy: IntegrityPolicy) -> Self {
        PanelMerger {
            engine: ReconciliationEngine::new(policy),
        }
    }

    pub fn policy(&self) -> IntegrityPolicy {
        self.engine.policy
    }

    // ========================================================================
    // STEP 0: COLUMN NAMES
    // ========================================================================

    /// Indicator value columns must be distinct and must not reuse an entity
    /// column name, or the panel header would be ambiguous
    pub fn check_columns(&self, indicators: &IndicatorTable) -> Result<()> {
        let entity: HashSet<String> = entity_schema().into_iter().map(|c| c.name).collect();
        let values: Vec<String> = indicator_schema(&indicators.columns)
            .into_iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name)
            .collect();

        let clashes: Vec<&str> = values
            .iter()
            .filter(|name| entity.contains(*name))
            .map(String::as_str)
            .collect();
        if !clashes.is_empty() {
            return Err(PanelError::Schema {
                source_name: "indicator table".to_string(),
                message: format!("columns also present in the entity table: {}", clashes.join(", ")),
            });
        }

        let repeated: Vec<String> = find_duplicates(values.iter())
            .into_iter()
            .map(|d| d.key.to_string())
            .collect();
        if !repeated.is_empty() {
            return Err(PanelError::Schema {
                source_name: "indicator table".to_string(),
                message: format!("columns appear more than once: {}", repeated.join(", ")),
            });
        }
        Ok(())
    }

    // ========================================================================
    // STEP A: TEMPORAL ALIGNMENT
    // ========================================================================

    /// Move every entity date to its month-end; returns how many moved
    pub fn align_entities(&self, rows: &mut [EntityObservation], sink: &mut dyn EventSink) -> usize {
        let mut realigned = 0;
        for row in rows.iter_mut().filter(|r| !temporal::is_month_end(r.date)) {
            row.date = temporal::month_end(row.date);
            realigned += 1;
        }
        sink.emit(PipelineEvent::Aligned {
            table: "entity".to_string(),
            realigned,
        });
        realigned
    }

    pub fn align_indicators(&self, table: &mut IndicatorTable, sink: &mut dyn EventSink) -> usize {
        let mut realigned = 0;
        for row in table.rows.iter_mut().filter(|r| !temporal::is_month_end(r.date)) {
            row.date = temporal::month_end(row.date);
            realigned += 1;
        }
        sink.emit(PipelineEvent::Aligned {
            table: "indicator".to_string(),
            realigned,
        });
        realigned
    }

    // ========================================================================
    // STEP B: CARDINALITY GUARDS
    // ========================================================================

    fn check_indicator_months(&self, table: &IndicatorTable, sink: &mut dyn EventSink) -> Result<()> {
        let duplicates = find_duplicates(table.months());
        if duplicates.is_empty() {
            self.engine.pass(
                "unique_indicator_months",
                format!("{} distinct months", table.len()),
                sink,
            );
            return Ok(());
        }

        let extra: usize = duplicates.iter().map(|d| d.extra_rows()).sum();
        let listed: Vec<String> = duplicates
            .iter()
            .take(MAX_LISTED_KEYS)
            .map(|d| format!("{} x{}", d.key, d.indices.len()))
            .collect();
        let detail = format!(
            "{} months appear more than once ({} extra rows): {}",
            duplicates.len(),
            extra,
            listed.join(", ")
        );
        sink.emit(PipelineEvent::IntegrityCheck {
            check: "unique_indicator_months".to_string(),
            passed: false,
            detail: detail.clone(),
        });
        self.engine.enforce("unique_indicator_months", detail, sink)
    }

    fn check_entity_keys(&self, rows: &[EntityObservation], sink: &mut dyn EventSink) -> Result<()> {
        let duplicates = find_duplicates(rows.iter().map(|r| r.key()));
        if duplicates.is_empty() {
            self.engine.pass(
                "unique_entity_keys",
                format!("{} distinct (ticker, month) keys", rows.len()),
                sink,
            );
            return Ok(());
        }

        let listed: Vec<String> = duplicates
            .iter()
            .take(MAX_LISTED_KEYS)
            .map(|d| format!("{}/{} x{}", d.key.0, d.key.1, d.indices.len()))
            .collect();
        let detail = format!(
            "{} (ticker, month) keys appear more than once: {}",
            duplicates.len(),
            listed.join(", ")
        );
        sink.emit(PipelineEvent::IntegrityCheck {
            check: "unique_entity_keys".to_string(),
            passed: false,
            detail: detail.clone(),
        });
        self.engine.enforce("unique_entity_keys", detail, sink)
    }

    // ========================================================================
    // STEP B: JOIN
    // ========================================================================

    /// Left join entities onto indicators by month.
    ///
    /// Every entity row yields exactly one panel row: matched rows copy all
    /// indicator values, unmatched rows carry none. When a month repeats (Warn
    /// policy only) the first occurrence is used.
    pub fn merge(
        &self,
        mut entities: Vec<EntityObservation>,
        mut indicators: IndicatorTable,
        sink: &mut dyn EventSink,
    ) -> Result<MergeOutcome> {
        if entities.is_empty() {
            return Err(PanelError::empty("merge (entity table)"));
        }
        if indicators.is_empty() {
            return Err(PanelError::empty("merge (indicator table)"));
        }
        self.check_columns(&indicators)?;

        self.align_entities(&mut entities, sink);
        self.align_indicators(&mut indicators, sink);

        self.check_indicator_months(&indicators, sink)?;
        self.check_entity_keys(&entities, sink)?;

        let mut index: HashMap<NaiveDate, usize> = HashMap::with_capacity(indicators.len());
        for (idx, row) in indicators.rows.iter().enumerate() {
            index.entry(row.date).or_insert(idx);
        }

        let entity_rows = entities.len();
        let rows: Vec<PanelRow> = entities
            .into_iter()
            .map(|entity| {
                let values = index
                    .get(&entity.date)
                    .map(|&idx| indicators.rows[idx].values.clone());
                PanelRow {
                    entity,
                    indicators: values,
                }
            })
            .collect();

        let panel = Panel {
            indicator_columns: indicators.columns,
            rows,
        };
        let matched = panel.matched_rows();
        sink.emit(PipelineEvent::MergeCompleted {
            entity_rows,
            indicator_rows: indicators.rows.len(),
            panel_rows: panel.len(),
            matched_rows: matched,
            unmatched_rows: panel.len() - matched,
        });

        // Step C: the panel must hold exactly one row per entity row
        let reconciliation = self.engine.reconcile(entity_rows, panel.len(), sink)?;

        Ok(MergeOutcome {
            panel: finalize(panel),
            reconciliation,
        })
    }
}

impl Default for PanelMerger {
    fn default() -> Self {
        Self::new(IntegrityPolicy::Strict)
    }
}

/// Step D: canonical row order, ticker then month
pub fn finalize(mut panel: Panel) -> Panel {
    panel.sort_canonical();
    panel
}

// ============================================================================
// TESTS
// ============================================================================
