// ⚙️ Pipeline configuration - paths, cleaning thresholds, integrity policy
//
// Loaded from a JSON file; every field has a default so a partial file (or
// no file at all) is valid.

use crate::error::{PanelError, Result};
use crate::reconciliation::IntegrityPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest YoY or lag look-back accepted, in months
pub const MAX_PERIODS: u32 = 1200;

// ============================================================================
// PATHS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub raw_entity: PathBuf,
    pub raw_indicator: PathBuf,
    pub clean_entity: PathBuf,
    pub clean_indicator: PathBuf,
    pub panel: PathBuf,
    pub summary: PathBuf,
    /// JSON run report; not written when None
    pub report: Option<PathBuf>,
}

impl Default for PathConfig {
    fn default() -> Self {
        PathConfig {
            raw_entity: PathBuf::from("data/raw/REIT_sample_2000_2024_All_Variables.csv"),
            raw_indicator: PathBuf::from("data/raw/fred_data_raw.csv"),
            clean_entity: PathBuf::from("data/processed/reit_data_clean.csv"),
            clean_indicator: PathBuf::from("data/processed/fred_data_clean.csv"),
            panel: PathBuf::from("data/final/reit_fred_analysis_panel.csv"),
            summary: PathBuf::from("data/final/summary_statistics.csv"),
            report: None,
        }
    }
}

// ============================================================================
// CLEANERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityCleanerConfig {
    /// Inclusive lower bound on the decimal return (-1.0 = -100%)
    pub return_min: f64,
    /// Inclusive upper bound on the decimal return (5.0 = +500%)
    pub return_max: f64,
}

impl Default for EntityCleanerConfig {
    fn default() -> Self {
        EntityCleanerConfig {
            return_min: -1.0,
            return_max: 5.0,
        }
    }
}

/// Year-over-year percent change of one indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoyConfig {
    pub source: String,
    pub column: String,
    pub periods: u32,
}

/// Fixed-period lags of one indicator, named `<source>_lag<k>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagConfig {
    pub source: String,
    pub periods: Vec<u32>,
}

impl LagConfig {
    pub fn column_name(&self, period: u32) -> String {
        format!("{}_lag{}", self.source, period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorCleanerConfig {
    /// Maximum staleness, in months, of a forward-filled value
    pub ffill_limit: u32,
    pub yoy: Option<YoyConfig>,
    pub lags: Option<LagConfig>,
}

impl Default for IndicatorCleanerConfig {
    fn default() -> Self {
        IndicatorCleanerConfig {
            ffill_limit: 2,
            yoy: Some(YoyConfig {
                source: "CPIAUCSL".to_string(),
                column: "cpi_inflation_yoy".to_string(),
                periods: 12,
            }),
            lags: Some(LagConfig {
                source: "FEDFUNDS".to_string(),
                periods: vec![1, 3],
            }),
        }
    }
}

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub policy: IntegrityPolicy,
    /// Columns missing in more than this share of rows raise a warning
    pub sparse_column_threshold_pct: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            policy: IntegrityPolicy::Strict,
            sparse_column_threshold_pct: 50.0,
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathConfig,
    pub entity: EntityCleanerConfig,
    pub indicator: IndicatorCleanerConfig,
    pub merge: MergeConfig,
}

impl PipelineConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PanelError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.entity.return_min <= self.entity.return_max) {
            return Err(PanelError::Config(format!(
                "return_min ({}) must not exceed return_max ({})",
                self.entity.return_min, self.entity.return_max
            )));
        }
        if let Some(yoy) = &self.indicator.yoy {
            if yoy.periods == 0 || yoy.periods > MAX_PERIODS {
                return Err(PanelError::Config(format!(
                    "yoy.periods must be within 1..={}, got {}",
                    MAX_PERIODS, yoy.periods
                )));
            }
        }
        if let Some(lags) = &self.indicator.lags {
            if let Some(p) = lags.periods.iter().find(|p| **p == 0 || **p > MAX_PERIODS) {
                return Err(PanelError::Config(format!(
                    "lag periods must be within 1..={}, got {}",
                    MAX_PERIODS, p
                )));
            }
        }
        let pct = self.merge.sparse_column_threshold_pct;
        if !(0.0..=100.0).contains(&pct) {
            return Err(PanelError::Config(format!(
                "sparse_column_threshold_pct must be within 0..=100, got {}",
                pct
            )));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
