// 📈 Indicator-Series Cleaner
//
// 1. parse dates, drop rows without one
// 2. fold each calendar month into one row (latest non-missing value per column)
// 3. reindex to the full monthly calendar
// 4. bounded forward fill: a value may be carried at most `ffill_limit`
//    months past the month it was observed in
// 5. drop rows still holding a gap
// 6. derived fields by calendar lookup (YoY change, lags); rows without
//    enough trailing history are dropped

use super::{parse_number, CleaningOutcome, CleaningReport, DropReason};
use crate::config::IndicatorCleanerConfig;
use crate::error::{PanelError, Result};
use crate::events::{EventSink, PipelineEvent, Stage};
use crate::parser::RawIndicatorTable;
use crate::schema::{IndicatorObservation, IndicatorTable};
use crate::temporal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

pub struct IndicatorCleaner {
    config: IndicatorCleanerConfig,
}

/// Month row before gap handling: one optional value per column
type SparseRow = (NaiveDate, Vec<Option<f64>>);

impl IndicatorCleaner {
    pub fn new(config: IndicatorCleanerConfig) -> Self {
        IndicatorCleaner { config }
    }

    pub fn clean(
        &self,
        raw: RawIndicatorTable,
        sink: &mut dyn EventSink,
    ) -> Result<CleaningOutcome<IndicatorTable>> {
        let RawIndicatorTable { columns, table } = raw;
        sink.emit(PipelineEvent::SourceLoaded {
            stage: Stage::IndicatorCleaning,
            source: table.source_name.clone(),
            rows: table.record_count(),
            columns: table.headers.clone(),
        });

        let mut report = CleaningReport::new(Stage::IndicatorCleaning, table.record_count());
        report.record_drops(DropReason::MalformedRecord, table.malformed_lines.len());

        // Step 1: typed rows
        let mut dated: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            if row.date.trim().is_empty() {
                report.record_drop(DropReason::MissingDate);
                continue;
            }
            let Some(date) = temporal::parse_date(&row.date) else {
                report.record_drop(DropReason::InvalidDate);
                continue;
            };
            let values = row.values.iter().map(|v| parse_number(Some(v))).collect();
            dated.push((date, values));
        }

        // Step 2: one row per month
        let before = dated.len();
        let monthly = consolidate_months(dated, columns.len());
        report.record_drops(DropReason::SameMonthConsolidated, before - monthly.len());

        // Step 3: full calendar
        let (calendar, inserted) = reindex_calendar(monthly, columns.len());
        report.synthesized_rows = inserted;
        if inserted > 0 {
            sink.emit(PipelineEvent::MonthsInserted { count: inserted });
        }

        // Step 4: bounded forward fill
        let (filled_rows, filled_counts) = forward_fill(calendar, self.config.ffill_limit);
        for (column, filled) in columns.iter().zip(filled_counts) {
            if filled > 0 {
                sink.emit(PipelineEvent::GapFilled {
                    column: column.clone(),
                    filled,
                });
            }
        }

        // Step 5: drop remaining gaps
        let mut complete = Vec::with_capacity(filled_rows.len());
        for (date, values) in filled_rows {
            match values.into_iter().collect::<Option<Vec<f64>>>() {
                Some(values) => complete.push(IndicatorObservation::new(date, values)),
                None => report.record_drop(DropReason::UnfilledGap),
            }
        }

        // Step 6: derived fields
        let base = IndicatorTable::with_rows(columns, complete);
        let (table, dropped) = self.derive(base, sink);
        report.record_drops(DropReason::InsufficientHistory, dropped);

        report.output_rows = table.len();
        report.emit(sink);

        if table.is_empty() {
            return Err(PanelError::empty(Stage::IndicatorCleaning.name()));
        }

        Ok(CleaningOutcome { table, report })
    }

    /// Append derived columns; returns the table and how many rows lacked history
    fn derive(&self, base: IndicatorTable, sink: &mut dyn EventSink) -> (IndicatorTable, usize) {
        let index: HashMap<NaiveDate, usize> = base
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.date, i))
            .collect();

        // (name, source, per-row value) for every derived column requested
        let mut derived: Vec<(String, String, Vec<Option<f64>>)> = Vec::new();

        if let Some(yoy) = &self.config.yoy {
            if let Some(col) = base.column_index(&yoy.source) {
                let values = base
                    .rows
                    .iter()
                    .map(|row| {
                        let prior = lookup(&base, &index, row.date, yoy.periods, col)?;
                        (prior != 0.0).then(|| (row.values[col] / prior - 1.0) * 100.0)
                    })
                    .collect();
                derived.push((yoy.column.clone(), yoy.source.clone(), values));
            } else {
                sink.emit(PipelineEvent::Warning {
                    stage: Stage::IndicatorCleaning,
                    message: format!("'{}' not in indicator series; {} skipped", yoy.source, yoy.column),
                });
            }
        }

        if let Some(lags) = &self.config.lags {
            if let Some(col) = base.column_index(&lags.source) {
                for period in &lags.periods {
                    let values = base
                        .rows
                        .iter()
                        .map(|row| lookup(&base, &index, row.date, *period, col))
                        .collect();
                    derived.push((lags.column_name(*period), lags.source.clone(), values));
                }
            } else {
                sink.emit(PipelineEvent::Warning {
                    stage: Stage::IndicatorCleaning,
                    message: format!("'{}' not in indicator series; lags skipped", lags.source),
                });
            }
        }

        // A derived name must not shadow a source column or an earlier derivation
        let mut taken: HashSet<String> = base.columns.iter().cloned().collect();
        derived.retain(|(name, source, _)| {
            if taken.insert(name.clone()) {
                return true;
            }
            sink.emit(PipelineEvent::Warning {
                stage: Stage::IndicatorCleaning,
                message: format!("column '{}' already present; derivation from '{}' skipped", name, source),
            });
            false
        });

        for (name, source, values) in &derived {
            sink.emit(PipelineEvent::DerivedColumn {
                name: name.clone(),
                source: source.clone(),
                rows_without_history: values.iter().filter(|v| v.is_none()).count(),
            });
        }

        let mut columns = base.columns.clone();
        columns.extend(derived.iter().map(|(name, _, _)| name.clone()));

        let mut rows = Vec::with_capacity(base.rows.len());
        let mut dropped = 0;
        for (i, row) in base.rows.iter().enumerate() {
            let extra: Option<Vec<f64>> = derived.iter().map(|(_, _, v)| v[i]).collect();
            match extra {
                Some(extra) => {
                    let mut values = row.values.clone();
                    values.extend(extra);
                    rows.push(IndicatorObservation::new(row.date, values));
                }
                None => dropped += 1,
            }
        }

        (IndicatorTable::with_rows(columns, rows), dropped)
    }

    /// Load an already-cleaned indicator file for the merge stage.
    ///
    /// No month folding happens here: duplicate months must reach the
    /// merger's cardinality check. Rows with any unusable cell are rejected.
    pub fn load_clean(
        &self,
        raw: RawIndicatorTable,
        sink: &mut dyn EventSink,
    ) -> Result<CleaningOutcome<IndicatorTable>> {
        let RawIndicatorTable { columns, table } = raw;
        sink.emit(PipelineEvent::SourceLoaded {
            stage: Stage::Merge,
            source: table.source_name.clone(),
            rows: table.record_count(),
            columns: table.headers.clone(),
        });

        let mut report = CleaningReport::new(Stage::Merge, table.record_count());
        report.record_drops(DropReason::MalformedRecord, table.malformed_lines.len());

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let Some(date) = temporal::parse_date(&row.date) else {
                report.record_drop(if row.date.trim().is_empty() {
                    DropReason::MissingDate
                } else {
                    DropReason::InvalidDate
                });
                continue;
            };
            let values: Option<Vec<f64>> = row.values.iter().map(|v| parse_number(Some(v))).collect();
            match values {
                Some(values) => rows.push(IndicatorObservation::new(date, values)),
                None => report.record_drop(DropReason::InvalidValue),
            }
        }
        report.output_rows = rows.len();

        for (reason, count) in &report.dropped {
            sink.emit(PipelineEvent::Warning {
                stage: Stage::Merge,
                message: format!(
                    "{} rows of cleaned indicator file {} rejected ({})",
                    count,
                    table.source_name,
                    reason.name()
                ),
            });
        }

        if rows.is_empty() {
            return Err(PanelError::empty("indicator input"));
        }

        Ok(CleaningOutcome {
            table: IndicatorTable::with_rows(columns, rows),
            report,
        })
    }
}

impl Default for IndicatorCleaner {
    fn default() -> Self {
        Self::new(IndicatorCleanerConfig::default())
    }
}

/// Value of column `col` exactly `periods` months before `date`, if that month exists
fn lookup(
    table: &IndicatorTable,
    index: &HashMap<NaiveDate, usize>,
    date: NaiveDate,
    periods: u32,
    col: usize,
) -> Option<f64> {
    let back = i32::try_from(periods).ok()?;
    let prior = temporal::shift_months(date, -back)?;
    index.get(&prior).map(|i| table.rows[*i].values[col])
}

/// Fold rows into month keys. Later dates overwrite earlier ones, column by
/// column, but a missing cell never erases an observed value.
fn consolidate_months(mut dated: Vec<(NaiveDate, Vec<Option<f64>>)>, width: usize) -> Vec<SparseRow> {
    // Stable: equal dates keep input order, so the later line wins
    dated.sort_by_key(|(date, _)| *date);

    let mut months: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (date, values) in dated {
        let slot = months
            .entry(temporal::month_end(date))
            .or_insert_with(|| vec![None; width]);
        for (cell, value) in slot.iter_mut().zip(values) {
            if value.is_some() {
                *cell = value;
            }
        }
    }
    months.into_iter().collect()
}

/// Insert all-missing rows for calendar months absent between first and last.
/// Returns the rows and how many were inserted.
fn reindex_calendar(monthly: Vec<SparseRow>, width: usize) -> (Vec<SparseRow>, usize) {
    let (Some(first), Some(last)) = (monthly.first().map(|r| r.0), monthly.last().map(|r| r.0)) else {
        return (monthly, 0);
    };

    let mut by_month: HashMap<NaiveDate, Vec<Option<f64>>> = monthly.into_iter().collect();
    let mut inserted = 0;
    let rows = temporal::month_range(first, last)
        .into_iter()
        .map(|month| match by_month.remove(&month) {
            Some(values) => (month, values),
            None => {
                inserted += 1;
                (month, vec![None; width])
            }
        })
        .collect();
    (rows, inserted)
}

/// Bounded lookback fill over consecutive calendar months.
/// Staleness is measured from the last OBSERVED value, so fills never chain.
fn forward_fill(mut rows: Vec<SparseRow>, limit: u32) -> (Vec<SparseRow>, Vec<usize>) {
    let width = rows.first().map(|r| r.1.len()).unwrap_or(0);
    let mut last_observed: Vec<Option<(NaiveDate, f64)>> = vec![None; width];
    let mut filled = vec![0usize; width];

    for (date, values) in rows.iter_mut() {
        for (col, cell) in values.iter_mut().enumerate() {
            match *cell {
                Some(v) => last_observed[col] = Some((*date, v)),
                None => {
                    if let Some((seen, v)) = last_observed[col] {
                        if temporal::months_between(seen, *date) <= limit as i32 {
                            *cell = Some(v);
                            filled[col] += 1;
                        }
                    }
                }
            }
        }
    }

    (rows, filled)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LagConfig, YoyConfig};
    use crate::events::MemorySink;
    use crate::parser::{IndicatorCsvReader, SourceReader};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn read(csv: &str) -> RawIndicatorTable {
        IndicatorCsvReader::new().read_from(csv.as_bytes(), "mem").unwrap()
    }

    fn plain() -> IndicatorCleaner {
        IndicatorCleaner::new(IndicatorCleanerConfig {
            ffill_limit: 2,
            yoy: None,
            lags: None,
        })
    }

    /// Monthly CSV for `n` months starting 2019-01 with values from `f`
    fn series(n: usize, f: impl Fn(usize) -> String) -> String {
        let mut csv = String::from("date,CPIAUCSL,FEDFUNDS\n");
        for i in 0..n {
            let month = temporal::shift_months(ymd(2019, 1, 31), i as i32).unwrap();
            csv.push_str(&format!("{},{}\n", month.format("%Y-%m-01"), f(i)));
        }
        csv
    }

    #[test]
    fn test_dates_normalized_to_month_end() {
        let raw = read("date,FEDFUNDS\n2020-01-01,1.5\n2020-02-01,1.6\n");
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        let months: Vec<NaiveDate> = outcome.table.months().collect();
        assert_eq!(months, vec![ymd(2020, 1, 31), ymd(2020, 2, 29)]);
    }

    #[test]
    fn test_finer_frequency_folds_to_latest_in_month() {
        let raw = read(
            "date,FEDFUNDS,UNRATE\n2020-01-20,1.6,\n2020-01-05,1.5,3.5\n2020-02-10,1.7,3.6\n",
        );
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        assert_eq!(outcome.table.len(), 2);
        // FEDFUNDS from the later Jan row, UNRATE kept from the earlier one
        assert_eq!(outcome.table.rows[0].values, vec![1.6, 3.5]);
        assert_eq!(outcome.report.count(DropReason::SameMonthConsolidated), 1);
        assert!(outcome.report.is_consistent());
    }

    #[test]
    fn test_short_gap_forward_filled() {
        // March and April missing entirely: 2 months, within the limit
        let raw = read("date,FEDFUNDS\n2020-01-01,1.0\n2020-02-01,2.0\n2020-05-01,5.0\n");
        let mut sink = MemorySink::new();
        let outcome = plain().clean(raw, &mut sink).unwrap();

        let values: Vec<f64> = outcome.table.column(0);
        assert_eq!(values, vec![1.0, 2.0, 2.0, 2.0, 5.0]);
        assert_eq!(outcome.report.synthesized_rows, 2);
        assert!(outcome.report.is_consistent());
        assert!(sink
            .events
            .contains(&PipelineEvent::GapFilled { column: "FEDFUNDS".to_string(), filled: 2 }));
    }

    #[test]
    fn test_long_gap_not_carried() {
        // Three missing months: Mar/Apr filled, May is 3 months stale and dropped
        let raw = read("date,FEDFUNDS\n2020-01-01,1.0\n2020-02-01,2.0\n2020-06-01,6.0\n");
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        let months: Vec<NaiveDate> = outcome.table.months().collect();
        assert_eq!(
            months,
            vec![ymd(2020, 1, 31), ymd(2020, 2, 29), ymd(2020, 3, 31), ymd(2020, 4, 30), ymd(2020, 6, 30)]
        );
        assert_eq!(outcome.report.count(DropReason::UnfilledGap), 1);
        assert!(outcome.report.is_consistent());
    }

    #[test]
    fn test_fill_is_per_column() {
        let raw = read("date,A,B\n2020-01-01,1,10\n2020-02-01,,20\n2020-03-01,3,\n");
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        assert_eq!(outcome.table.column(0), vec![1.0, 1.0, 3.0]);
        assert_eq!(outcome.table.column(1), vec![10.0, 20.0, 20.0]);
    }

    #[test]
    fn test_leading_gap_dropped() {
        let raw = read("date,A,B\n2020-01-01,,10\n2020-02-01,2,20\n");
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.table.rows[0].date, ymd(2020, 2, 29));
        assert_eq!(outcome.report.count(DropReason::UnfilledGap), 1);
    }

    #[test]
    fn test_yoy_and_lags() {
        // CPI grows 1 per month from 100; FEDFUNDS = month number
        let raw = read(&series(15, |i| format!("{},{}", 100 + i, i)));
        let outcome = IndicatorCleaner::default()
            .clean(raw, &mut MemorySink::new())
            .unwrap();
        let table = &outcome.table;

        assert_eq!(
            table.columns,
            vec!["CPIAUCSL", "FEDFUNDS", "cpi_inflation_yoy", "FEDFUNDS_lag1", "FEDFUNDS_lag3"]
        );
        // First 12 months lack a year of history
        assert_eq!(table.len(), 3);
        assert_eq!(outcome.report.count(DropReason::InsufficientHistory), 12);
        assert!(outcome.report.is_consistent());

        let first = &table.rows[0];
        assert_eq!(first.date, ymd(2020, 1, 31));
        assert!((first.values[2] - 12.0).abs() < 1e-9); // 112 / 100 - 1
        assert_eq!(first.values[3], 11.0);
        assert_eq!(first.values[4], 9.0);
    }

    #[test]
    fn test_derived_field_skipped_when_source_absent() {
        let raw = read("date,UNRATE\n2020-01-01,3.5\n2020-02-01,3.6\n");
        let mut sink = MemorySink::new();
        let outcome = IndicatorCleaner::default().clean(raw, &mut sink).unwrap();

        assert_eq!(outcome.table.columns, vec!["UNRATE".to_string()]);
        assert_eq!(outcome.table.len(), 2);
        assert_eq!(sink.warnings().len(), 2);
    }

    #[test]
    fn test_derived_name_already_in_series() {
        // Re-cleaning an already-derived file must not duplicate the lag column
        let mut csv = String::from("date,FEDFUNDS,FEDFUNDS_lag1\n");
        for (i, month) in ["2020-01-01", "2020-02-01", "2020-03-01", "2020-04-01", "2020-05-01"]
            .iter()
            .enumerate()
        {
            csv.push_str(&format!("{},{},{}\n", month, i + 1, i));
        }
        let mut sink = MemorySink::new();
        let outcome = IndicatorCleaner::default()
            .clean(read(&csv), &mut sink)
            .unwrap();

        assert_eq!(
            outcome.table.columns,
            vec!["FEDFUNDS", "FEDFUNDS_lag1", "FEDFUNDS_lag3"]
        );
        let unique: HashSet<&String> = outcome.table.columns.iter().collect();
        assert_eq!(unique.len(), outcome.table.columns.len());
        assert!(sink
            .warnings()
            .iter()
            .any(|w| w.contains("FEDFUNDS_lag1") && w.contains("skipped")));
        // Source lag column is kept as read; lag3 leaves Apr and May
        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.table.rows[0].values, vec![4.0, 3.0, 1.0]);
    }

    #[test]
    fn test_duplicate_lag_periods_derived_once() {
        let cleaner = IndicatorCleaner::new(IndicatorCleanerConfig {
            ffill_limit: 0,
            yoy: None,
            lags: Some(LagConfig {
                source: "FEDFUNDS".to_string(),
                periods: vec![1, 1],
            }),
        });
        let raw = read("date,FEDFUNDS\n2020-01-01,1.0\n2020-02-01,2.0\n");
        let mut sink = MemorySink::new();
        let outcome = cleaner.clean(raw, &mut sink).unwrap();

        assert_eq!(outcome.table.columns, vec!["FEDFUNDS", "FEDFUNDS_lag1"]);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_lag_beyond_calendar_has_no_history() {
        let cleaner = IndicatorCleaner::new(IndicatorCleanerConfig {
            ffill_limit: 0,
            yoy: None,
            lags: Some(LagConfig {
                source: "FEDFUNDS".to_string(),
                periods: vec![u32::MAX],
            }),
        });
        let raw = read("date,FEDFUNDS\n2020-01-01,1.0\n2020-02-01,2.0\n");
        let mut sink = MemorySink::new();
        let err = cleaner.clean(raw, &mut sink).unwrap_err();

        assert!(matches!(err, PanelError::EmptyResult { .. }));
        assert_eq!(sink.dropped(Stage::IndicatorCleaning, DropReason::InsufficientHistory), 2);
    }

    #[test]
    fn test_custom_derived_config() {
        let cleaner = IndicatorCleaner::new(IndicatorCleanerConfig {
            ffill_limit: 0,
            yoy: Some(YoyConfig {
                source: "FEDFUNDS".to_string(),
                column: "ff_change".to_string(),
                periods: 1,
            }),
            lags: Some(LagConfig {
                source: "FEDFUNDS".to_string(),
                periods: vec![2],
            }),
        });
        let raw = read("date,FEDFUNDS\n2020-01-01,1.0\n2020-02-01,2.0\n2020-03-01,3.0\n");
        let outcome = cleaner.clean(raw, &mut MemorySink::new()).unwrap();

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.table.rows[0].values, vec![3.0, 50.0, 1.0]);
    }

    #[test]
    fn test_months_unique_and_increasing() {
        let raw = read("date,A\n2020-03-15,3\n2020-01-01,1\n2020-02-01,2\n2020-01-31,1.1\n");
        let outcome = plain().clean(raw, &mut MemorySink::new()).unwrap();

        let months: Vec<NaiveDate> = outcome.table.months().collect();
        assert!(months.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(outcome.table.rows[0].values, vec![1.1]);
    }

    #[test]
    fn test_bad_dates_dropped_and_empty_result() {
        let raw = read("date,A\n,1\nnot-a-date,2\n");
        let mut sink = MemorySink::new();
        let err = plain().clean(raw, &mut sink).unwrap_err();

        assert!(matches!(err, PanelError::EmptyResult { .. }));
        assert_eq!(sink.dropped(Stage::IndicatorCleaning, DropReason::MissingDate), 1);
        assert_eq!(sink.dropped(Stage::IndicatorCleaning, DropReason::InvalidDate), 1);
    }

    #[test]
    fn test_load_clean_keeps_duplicate_months() {
        let raw = read("date,rate\n2020-01-31,1.5\n2020-01-31,1.7\n2020-02-29,\n");
        let mut sink = MemorySink::new();
        let outcome = plain().load_clean(raw, &mut sink).unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.report.count(DropReason::InvalidValue), 1);
        assert_eq!(sink.warnings().len(), 1);
    }
}
