// Panel Merge - Core Library
// Builds a monthly entity panel from an entity CSV and an indicator CSV.
// Exposes all modules for use in the CLI and tests.

pub mod error;
pub mod events;
pub mod config;
pub mod temporal;       // Month keys and calendar arithmetic
pub mod schema;         // Shape Layer - typed rows and the panel
pub mod parser;         // CSV readers for both sources
pub mod deduplication;  // Key uniqueness
pub mod cleaning;       // Entity + indicator cleaners
pub mod reconciliation; // Row-count reconciliation and integrity policy
pub mod merge;          // Key-indexed left join
pub mod data_quality;   // Missingness, coverage, quality issues
pub mod stats;          // Descriptive statistics
pub mod writer;         // CSV output + SHA-256 digests
pub mod pipeline;

// Re-export commonly used types
pub use error::{PanelError, Result};
pub use events::{
    EventRecord, EventSink, MemorySink, NullSink, PipelineEvent, RecordingSink, Stage, TracingSink,
};
pub use config::{
    EntityCleanerConfig, IndicatorCleanerConfig, LagConfig, MergeConfig, PathConfig,
    PipelineConfig, YoyConfig,
};
pub use schema::{
    EntityObservation, FinancialAttributes, IndicatorObservation, IndicatorTable, Panel, PanelRow,
};
pub use parser::{EntityCsvReader, IndicatorCsvReader, SourceReader};
pub use cleaning::{CleaningOutcome, CleaningReport, DropReason, EntityCleaner, IndicatorCleaner};
pub use reconciliation::{IntegrityPolicy, ReconciliationEngine, ReconciliationResult};
pub use merge::{MergeOutcome, PanelMerger};
pub use data_quality::{
    CoverageReport, MissingValueReport, PanelValidator, QualityIssue, Severity, ValidationReport,
};
pub use stats::{summarize_panel, ColumnSummary, SummaryTable};
pub use writer::OutputInfo;
pub use pipeline::{MergeSummary, Pipeline, PipelineReport, StageSelection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
