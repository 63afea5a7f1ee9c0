// 🏗️ Source readers - raw CSV in, untyped rows out
//
// Readers only split files into records. They never decide whether a row is
// valid; that is the cleaners' job, so every rejected row can be counted.

use crate::error::{PanelError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Entity-level return / financial panel
    EntityPanel,
    /// Macroeconomic indicator series
    IndicatorSeries,
}

impl SourceKind {
    pub fn name(&self) -> &str {
        match self {
            SourceKind::EntityPanel => "entity panel",
            SourceKind::IndicatorSeries => "indicator series",
        }
    }
}

/// Raw entity row. Every cell stays text until the cleaner looks at it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEntityRow {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub usdret: Option<String>,
    #[serde(default)]
    pub market_equity: Option<String>,
    #[serde(default)]
    pub ptype: Option<String>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub sales: Option<String>,
    #[serde(default)]
    pub net_income: Option<String>,
    #[serde(default)]
    pub book_equity: Option<String>,
    #[serde(default)]
    pub debt_at: Option<String>,
}

/// Raw indicator row: the date cell plus one cell per indicator column
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndicatorRow {
    pub line_number: usize,
    pub date: String,
    pub values: Vec<String>,
}

/// Rows read from one source, plus the lines that could not be read at all
#[derive(Debug, Clone)]
pub struct RawTable<T> {
    pub source_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<T>,
    pub malformed_lines: Vec<usize>,
}

impl<T> RawTable<T> {
    /// Every record seen, readable or not
    pub fn record_count(&self) -> usize {
        self.rows.len() + self.malformed_lines.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.eq_ignore_ascii_case(name))
    }
}

/// Indicator rows keep their value column names next to them
#[derive(Debug, Clone)]
pub struct RawIndicatorTable {
    pub columns: Vec<String>,
    pub table: RawTable<RawIndicatorRow>,
}

// ============================================================================
// READER TRAIT
// ============================================================================

/// SourceReader - one implementation per source layout
pub trait SourceReader {
    type Output;

    /// Read from any byte stream; `source_name` is only used in messages
    fn read_from<R: Read>(&self, reader: R, source_name: &str) -> Result<Self::Output>;

    fn source_kind(&self) -> SourceKind;

    /// Read a file. A missing file is `MissingInput`, not an IO error.
    fn read_path(&self, path: &Path) -> Result<Self::Output> {
        if !path.exists() {
            return Err(PanelError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        debug!(kind = self.source_kind().name(), path = %path.display(), "reading source");
        let file = File::open(path)?;
        self.read_from(file, &path.display().to_string())
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader)
}

fn normalized_headers(record: &StringRecord) -> Vec<String> {
    record.iter().map(|h| h.trim().to_lowercase()).collect()
}

// ============================================================================
// ENTITY PANEL
// ============================================================================

pub struct EntityCsvReader;

impl EntityCsvReader {
    pub fn new() -> Self {
        EntityCsvReader
    }
}

impl Default for EntityCsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceReader for EntityCsvReader {
    type Output = RawTable<RawEntityRow>;

    fn read_from<R: Read>(&self, reader: R, source_name: &str) -> Result<Self::Output> {
        let mut rdr = csv_reader(reader);

        // Header names are matched case-insensitively
        let headers = normalized_headers(rdr.headers()?);
        rdr.set_headers(StringRecord::from(headers.clone()));

        let mut rows = Vec::new();
        let mut malformed_lines = Vec::new();

        for (idx, result) in rdr.deserialize::<RawEntityRow>().enumerate() {
            match result {
                Ok(row) => rows.push(row),
                // +2: 1-indexed plus the header row
                Err(_) => malformed_lines.push(idx + 2),
            }
        }

        Ok(RawTable {
            source_name: source_name.to_string(),
            headers,
            rows,
            malformed_lines,
        })
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::EntityPanel
    }
}

// ============================================================================
// INDICATOR SERIES
// ============================================================================

pub struct IndicatorCsvReader {
    date_column: String,
}

impl IndicatorCsvReader {
    pub fn new() -> Self {
        IndicatorCsvReader {
            date_column: "date".to_string(),
        }
    }

    pub fn with_date_column(date_column: impl Into<String>) -> Self {
        IndicatorCsvReader {
            date_column: date_column.into(),
        }
    }
}

impl Default for IndicatorCsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceReader for IndicatorCsvReader {
    type Output = RawIndicatorTable;

    fn read_from<R: Read>(&self, reader: R, source_name: &str) -> Result<Self::Output> {
        let mut rdr = csv_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let date_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(&self.date_column))
            .ok_or_else(|| PanelError::Schema {
                source_name: source_name.to_string(),
                message: format!("no '{}' column in header {:?}", self.date_column, headers),
            })?;

        // Indicator names keep their header case (FEDFUNDS, UNRATE, ...)
        let value_indices: Vec<usize> = (0..headers.len()).filter(|i| *i != date_idx).collect();
        if value_indices.is_empty() {
            return Err(PanelError::Schema {
                source_name: source_name.to_string(),
                message: "no indicator columns besides the date".to_string(),
            });
        }
        let columns: Vec<String> = value_indices.iter().map(|i| headers[*i].clone()).collect();

        let mut rows = Vec::new();
        let mut malformed_lines = Vec::new();

        for (idx, result) in rdr.records().enumerate() {
            let line_number = idx + 2;
            let record = match result {
                Ok(record) => record,
                Err(_) => {
                    malformed_lines.push(line_number);
                    continue;
                }
            };

            let date = record.get(date_idx).unwrap_or("").to_string();
            let values = value_indices
                .iter()
                .map(|i| record.get(*i).unwrap_or("").to_string())
                .collect();

            rows.push(RawIndicatorRow {
                line_number,
                date,
                values,
            });
        }

        Ok(RawIndicatorTable {
            columns,
            table: RawTable {
                source_name: source_name.to_string(),
                headers,
                rows,
                malformed_lines,
            },
        })
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::IndicatorSeries
    }
}

// ============================================================================
// TESTS
// ============================================================================
