// 🚨 Error taxonomy for the panel pipeline
// Row-level schema problems never reach this type: cleaners drop the row and count it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    /// A required source file is absent. The stage aborts, nothing is written.
    #[error("Missing input: {} not found", path.display())]
    MissingInput { path: PathBuf },

    /// A file is unusable as a whole (no header, no required columns).
    #[error("Schema error in {source_name}: {message}")]
    Schema { source_name: String, message: String },

    /// Duplicate keys or a row-count mismatch where the policy is strict.
    #[error("Integrity violation [{check}]: {detail}")]
    IntegrityViolation { check: String, detail: String },

    /// A stage produced zero rows; downstream stages refuse to run on it.
    #[error("Empty result: stage '{stage}' produced no rows")]
    EmptyResult { stage: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PanelError {
    pub fn integrity(check: &str, detail: impl Into<String>) -> Self {
        PanelError::IntegrityViolation {
            check: check.to_string(),
            detail: detail.into(),
        }
    }

    pub fn empty(stage: &str) -> Self {
        PanelError::EmptyResult {
            stage: stage.to_string(),
        }
    }

    /// True for the errors that mean "no data to work with" rather than a bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PanelError::MissingInput { .. } | PanelError::EmptyResult { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
