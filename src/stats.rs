// 📊 Descriptive statistics for the final panel
// count / mean / std (n-1) / min / 25% / 50% / 75% / max per numeric column

use crate::schema::Panel;
use serde::{Deserialize, Serialize};

pub const STAT_NAMES: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    /// Values in `STAT_NAMES` order; count is always present
    pub fn as_row(&self) -> [Option<f64>; 8] {
        [
            Some(self.count as f64),
            self.mean,
            self.std,
            self.min,
            self.q25,
            self.q50,
            self.q75,
            self.max,
        ]
    }
}

/// Summarize the non-missing values of one column
pub fn describe(values: &[f64]) -> ColumnSummary {
    let count = values.len();
    if count == 0 {
        return ColumnSummary::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (count > 1).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });

    ColumnSummary {
        count,
        mean: Some(mean),
        std,
        min: sorted.first().copied(),
        q25: Some(quantile(&sorted, 0.25)),
        q50: Some(quantile(&sorted, 0.50)),
        q75: Some(quantile(&sorted, 0.75)),
        max: sorted.last().copied(),
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

// ============================================================================
// PANEL SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub columns: Vec<(String, ColumnSummary)>,
}

impl SummaryTable {
    pub fn get(&self, column: &str) -> Option<&ColumnSummary> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, s)| s)
    }
}

/// Describe every numeric column of the panel, in schema order
pub fn summarize_panel(panel: &Panel) -> SummaryTable {
    let schema = panel.schema();
    let indicator_count = panel.indicator_columns.len();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); schema.len()];

    for row in &panel.rows {
        for (col, cell) in row.cells(indicator_count).iter().enumerate() {
            if let Some(v) = cell.as_number() {
                values[col].push(v);
            }
        }
    }

    let columns = schema
        .into_iter()
        .zip(values)
        .filter(|(def, _)| def.is_numeric())
        .map(|(def, vals)| (def.name, describe(&vals)))
        .collect();

    SummaryTable { columns }
}

// ============================================================================
// TESTS
// ============================================================================
