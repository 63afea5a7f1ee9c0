// ⚖️ Reconciliation Engine - the panel must account for every entity row
//
//   rowcount(panel) == rowcount(clean entity table)
//
// A left join on a unique month key can neither lose nor add rows. If the
// count moves anyway, a key was not unique (fan-out) or a row went missing,
// and the run cannot be trusted.

use crate::error::{PanelError, Result};
use crate::events::{EventSink, PipelineEvent, Stage};
use serde::{Deserialize, Serialize};

// ============================================================================
// POLICY
// ============================================================================

/// What an integrity failure does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// Abort with `IntegrityViolation`
    #[default]
    Strict,
    /// Report a warning and continue
    Warn,
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconciliationResult {
    Balanced { rows: usize },
    RowLoss { expected: usize, actual: usize, lost: usize },
    RowDuplication { expected: usize, actual: usize, extra: usize },
}

impl ReconciliationResult {
    pub fn compare(expected: usize, actual: usize) -> Self {
        if actual == expected {
            ReconciliationResult::Balanced { rows: actual }
        } else if actual < expected {
            ReconciliationResult::RowLoss {
                expected,
                actual,
                lost: expected - actual,
            }
        } else {
            ReconciliationResult::RowDuplication {
                expected,
                actual,
                extra: actual - expected,
            }
        }
    }

    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }

    /// actual - expected
    pub fn difference(&self) -> i64 {
        match self {
            ReconciliationResult::Balanced { .. } => 0,
            ReconciliationResult::RowLoss { lost, .. } => -(*lost as i64),
            ReconciliationResult::RowDuplication { extra, .. } => *extra as i64,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ReconciliationResult::Balanced { rows } => format!("no data loss ({} rows)", rows),
            ReconciliationResult::RowLoss {
                expected,
                actual,
                lost,
            } => format!("{} rows lost: expected {}, got {}", lost, expected, actual),
            ReconciliationResult::RowDuplication {
                expected,
                actual,
                extra,
            } => format!("{} rows duplicated: expected {}, got {}", extra, expected, actual),
        }
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    pub policy: IntegrityPolicy,
}

impl ReconciliationEngine {
    pub fn new(policy: IntegrityPolicy) -> Self {
        ReconciliationEngine { policy }
    }

    /// Compare merged rows against entity rows and apply the policy
    pub fn reconcile(
        &self,
        expected: usize,
        actual: usize,
        sink: &mut dyn EventSink,
    ) -> Result<ReconciliationResult> {
        let result = ReconciliationResult::compare(expected, actual);
        sink.emit(PipelineEvent::IntegrityCheck {
            check: "row_count".to_string(),
            passed: result.is_balanced(),
            detail: result.summary(),
        });

        if !result.is_balanced() {
            self.enforce("row_count", result.summary(), sink)?;
        }
        Ok(result)
    }

    /// Strict: fail with `IntegrityViolation`. Warn: emit a warning, carry on.
    pub fn enforce(&self, check: &str, detail: String, sink: &mut dyn EventSink) -> Result<()> {
        match self.policy {
            IntegrityPolicy::Strict => Err(PanelError::integrity(check, detail)),
            IntegrityPolicy::Warn => {
                sink.emit(PipelineEvent::Warning {
                    stage: Stage::Merge,
                    message: format!("[{}] {}", check, detail),
                });
                Ok(())
            }
        }
    }

    /// Record a passed check
    pub fn pass(&self, check: &str, detail: String, sink: &mut dyn EventSink) {
        sink.emit(PipelineEvent::IntegrityCheck {
            check: check.to_string(),
            passed: true,
            detail,
        });
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(IntegrityPolicy::Strict)
    }
}

// ============================================================================
// TESTS
// ============================================================================
