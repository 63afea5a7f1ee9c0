// ✅ Data Quality - post-merge validation of the entity panel
//
// Three reports over the merged panel:
//   - missingness per column (only columns with gaps, worst first)
//   - coverage: unique entities x unique months vs actual rows
//   - quality issues with a severity and a recommendation

use crate::events::{EventSink, PipelineEvent, Stage};
use crate::schema::Panel;
use crate::temporal::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// ============================================================================
// QUALITY ISSUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Panel is unusable for analysis
    Warning,  // Panel is usable but incomplete
    Info,     // Expected property worth knowing about
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

impl QualityIssue {
    fn new(severity: Severity, field: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity,
            field: field.to_string(),
            issue,
            recommendation: recommendation.to_string(),
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValueReport {
    pub column: String,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub unique_entities: usize,
    pub unique_months: usize,
    /// unique_entities * unique_months
    pub balanced_size: usize,
    pub actual_rows: usize,
    /// balanced_size - actual_rows; positive means entity-months are absent
    pub imbalance: i64,
    pub date_range: Option<DateRange>,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    /// Months with at least one entity row but no indicator values
    pub unmatched_months: Vec<NaiveDate>,
}

impl CoverageReport {
    pub fn is_balanced(&self) -> bool {
        self.imbalance == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub missing: Vec<MissingValueReport>,
    pub coverage: CoverageReport,
    pub issues: Vec<QualityIssue>,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} rows x {} columns, {} columns with missing values, imbalance {}, issues: {} ({} critical)",
            self.total_rows,
            self.total_columns,
            self.missing.len(),
            self.coverage.imbalance,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::Critical)
    }

    pub fn missing_for(&self, column: &str) -> Option<&MissingValueReport> {
        self.missing.iter().find(|m| m.column == column)
    }
}

// ============================================================================
// PANEL VALIDATOR
// ============================================================================

pub struct PanelValidator {
    /// Columns missing in more than this share of rows are flagged
    sparse_column_threshold_pct: f64,
}

impl PanelValidator {
    pub fn new(sparse_column_threshold_pct: f64) -> Self {
        PanelValidator {
            sparse_column_threshold_pct,
        }
    }

    pub fn validate(&self, panel: &Panel, sink: &mut dyn EventSink) -> ValidationReport {
        let missing = missing_values(panel);
        for m in &missing {
            sink.emit(PipelineEvent::MissingValues {
                column: m.column.clone(),
                count: m.count,
                pct: m.pct,
            });
        }

        let coverage = coverage(panel);
        sink.emit(PipelineEvent::Coverage {
            unique_entities: coverage.unique_entities,
            unique_months: coverage.unique_months,
            balanced_size: coverage.balanced_size,
            actual_rows: coverage.actual_rows,
            imbalance: coverage.imbalance,
        });

        let issues = self.find_issues(&missing, &coverage);
        for issue in issues.iter().filter(|i| i.severity != Severity::Info) {
            sink.emit(PipelineEvent::Warning {
                stage: Stage::Validation,
                message: format!("{}: {}", issue.field, issue.issue),
            });
        }

        ValidationReport {
            total_rows: panel.len(),
            total_columns: panel.schema().len(),
            missing,
            coverage,
            issues,
        }
    }

    fn find_issues(&self, missing: &[MissingValueReport], coverage: &CoverageReport) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        if coverage.actual_rows > 0 && coverage.matched_rows == 0 {
            issues.push(QualityIssue::new(
                Severity::Critical,
                "date",
                "no entity row matched any indicator month".to_string(),
                "Check that both sources cover overlapping periods",
            ));
        } else if !coverage.unmatched_months.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Warning,
                "date",
                format!(
                    "{} rows in {} months have no indicator values",
                    coverage.unmatched_rows,
                    coverage.unmatched_months.len()
                ),
                "Extend the indicator series or restrict the entity date range",
            ));
        }

        for m in missing
            .iter()
            .filter(|m| m.pct > self.sparse_column_threshold_pct)
        {
            issues.push(QualityIssue::new(
                Severity::Warning,
                &m.column,
                format!("{:.1}% of values missing", m.pct),
                "Avoid this column in analyses that need complete cases",
            ));
        }

        if coverage.imbalance > 0 {
            issues.push(QualityIssue::new(
                Severity::Info,
                "ticker",
                format!(
                    "unbalanced panel: {} of {} entity-months present",
                    coverage.actual_rows, coverage.balanced_size
                ),
                "Entities enter and leave the sample; use methods robust to unbalanced panels",
            ));
        }

        issues
    }
}

impl Default for PanelValidator {
    fn default() -> Self {
        Self::new(50.0)
    }
}

/// Columns with at least one missing cell, most missing first, ties in column order
pub fn missing_values(panel: &Panel) -> Vec<MissingValueReport> {
    let names = panel.column_names();
    let indicator_count = panel.indicator_columns.len();
    let mut counts = vec![0usize; names.len()];

    for row in &panel.rows {
        for (col, cell) in row.cells(indicator_count).iter().enumerate() {
            if cell.is_missing() {
                counts[col] += 1;
            }
        }
    }

    let total = panel.len();
    let mut report: Vec<MissingValueReport> = names
        .into_iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(column, count)| MissingValueReport {
            column,
            count,
            pct: count as f64 / total as f64 * 100.0,
        })
        .collect();

    // Stable, so equal counts keep column order
    report.sort_by(|a, b| b.count.cmp(&a.count));
    report
}

pub fn coverage(panel: &Panel) -> CoverageReport {
    let entities: HashSet<&str> = panel.rows.iter().map(|r| r.entity.ticker.as_str()).collect();
    let months: HashSet<NaiveDate> = panel.rows.iter().map(|r| r.entity.date).collect();
    let unmatched_months: BTreeSet<NaiveDate> = panel
        .rows
        .iter()
        .filter(|r| !r.is_matched())
        .map(|r| r.entity.date)
        .collect();

    let balanced_size = entities.len() * months.len();
    let matched_rows = panel.matched_rows();

    CoverageReport {
        unique_entities: entities.len(),
        unique_months: months.len(),
        balanced_size,
        actual_rows: panel.len(),
        imbalance: balanced_size as i64 - panel.len() as i64,
        date_range: DateRange::from_dates(months.iter().copied()),
        matched_rows,
        unmatched_rows: panel.len() - matched_rows,
        unmatched_months: unmatched_months.into_iter().collect(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
