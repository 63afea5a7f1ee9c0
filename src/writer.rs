// 💾 Output writer - CSV rendering, file output and content digests
//
// Tables are rendered into memory first, then written in one call. The same
// bytes feed the SHA-256 digest, so the digest always describes the file on disk.

use crate::error::{PanelError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::schema::{Cell, EntityObservation, IndicatorTable, Panel, ENTITY_COLUMNS};
use crate::stats::{SummaryTable, STAT_NAMES};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub bytes: u64,
    pub sha256: String,
}

// ============================================================================
// RENDERING
// ============================================================================

fn format_cell(cell: &Cell<'_>) -> String {
    match cell {
        Cell::Text(s) => s.to_string(),
        Cell::Date(d) => d.format(DATE_FORMAT).to_string(),
        // Shortest representation that parses back to the same value
        Cell::Number(v) => format!("{}", v),
        Cell::Missing => String::new(),
    }
}

fn format_option(value: Option<f64>) -> String {
    value.map(|v| format!("{}", v)).unwrap_or_default()
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| PanelError::Io(e.into_error()))
}

/// Merged panel: entity columns, then indicator columns
pub fn render_panel(panel: &Panel) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(panel.column_names())?;

    let indicator_count = panel.indicator_columns.len();
    for row in &panel.rows {
        wtr.write_record(row.cells(indicator_count).iter().map(format_cell))?;
    }
    finish(wtr)
}

/// Cleaned entity table, same layout as the entity columns of the panel
pub fn render_entities(rows: &[EntityObservation]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(ENTITY_COLUMNS)?;
    for row in rows {
        wtr.write_record(row.cells().iter().map(format_cell))?;
    }
    finish(wtr)
}

pub fn render_indicators(table: &IndicatorTable) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let header = std::iter::once("date").chain(table.columns.iter().map(String::as_str));
    wtr.write_record(header)?;

    for row in &table.rows {
        let date = row.date.format(DATE_FORMAT).to_string();
        let record = std::iter::once(date).chain(row.values.iter().map(|v| format!("{}", v)));
        wtr.write_record(record)?;
    }
    finish(wtr)
}

/// Transposed describe layout: `,col1,col2,...` then one row per statistic
pub fn render_summary(summary: &SummaryTable) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let header = std::iter::once("").chain(summary.columns.iter().map(|(name, _)| name.as_str()));
    wtr.write_record(header)?;

    let rows: Vec<[Option<f64>; 8]> = summary.columns.iter().map(|(_, s)| s.as_row()).collect();
    for (stat_idx, stat) in STAT_NAMES.iter().enumerate() {
        let record = std::iter::once(stat.to_string())
            .chain(rows.iter().map(|values| format_option(values[stat_idx])));
        wtr.write_record(record)?;
    }
    finish(wtr)
}

// ============================================================================
// FILE OUTPUT
// ============================================================================

/// Hex SHA-256 of a byte buffer
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write one rendered table, creating parent directories as needed
pub fn write_output(
    path: &Path,
    bytes: &[u8],
    rows: usize,
    columns: usize,
    sink: &mut dyn EventSink,
) -> Result<OutputInfo> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;

    let info = OutputInfo {
        path: path.to_path_buf(),
        rows,
        columns,
        bytes: bytes.len() as u64,
        sha256: sha256_hex(bytes),
    };
    sink.emit(PipelineEvent::OutputWritten {
        path: path.display().to_string(),
        rows,
        columns,
        bytes: info.bytes,
    });
    Ok(info)
}

pub fn write_panel(path: &Path, panel: &Panel, sink: &mut dyn EventSink) -> Result<OutputInfo> {
    let bytes = render_panel(panel)?;
    write_output(path, &bytes, panel.len(), panel.schema().len(), sink)
}

pub fn write_entities(path: &Path, rows: &[EntityObservation], sink: &mut dyn EventSink) -> Result<OutputInfo> {
    let bytes = render_entities(rows)?;
    write_output(path, &bytes, rows.len(), ENTITY_COLUMNS.len(), sink)
}

pub fn write_indicators(path: &Path, table: &IndicatorTable, sink: &mut dyn EventSink) -> Result<OutputInfo> {
    let bytes = render_indicators(table)?;
    write_output(path, &bytes, table.len(), table.columns.len() + 1, sink)
}

pub fn write_summary(path: &Path, summary: &SummaryTable, sink: &mut dyn EventSink) -> Result<OutputInfo> {
    let bytes = render_summary(summary)?;
    write_output(path, &bytes, STAT_NAMES.len(), summary.columns.len() + 1, sink)
}

// ============================================================================
// TESTS
// ============================================================================
