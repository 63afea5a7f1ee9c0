// 🏢 Entity-Panel Cleaner
//
// Output contract relied on by the merger:
//   - ticker non-empty, trimmed, uppercased
//   - date parsed and normalised to month-end
//   - usdret within [return_min, return_max]
//   - (ticker, month) unique, first occurrence kept
// Checks run in that order; each rejected row is counted once, under the
// first check it failed.

use super::{non_empty, parse_number, CleaningOutcome, CleaningReport, DropReason};
use crate::config::EntityCleanerConfig;
use crate::deduplication::KeyDeduplicator;
use crate::error::{PanelError, Result};
use crate::events::{EventSink, PipelineEvent, Stage};
use crate::parser::{RawEntityRow, RawTable};
use crate::schema::{EntityObservation, FinancialAttributes};
use crate::stats;
use crate::temporal::{self, DateRange};
use std::collections::BTreeMap;

pub struct EntityCleaner {
    config: EntityCleanerConfig,
}

impl EntityCleaner {
    pub fn new(config: EntityCleanerConfig) -> Self {
        EntityCleaner { config }
    }

    /// Clean a raw entity table. Zero surviving rows is `EmptyResult`.
    pub fn clean(
        &self,
        raw: RawTable<RawEntityRow>,
        sink: &mut dyn EventSink,
    ) -> Result<CleaningOutcome<Vec<EntityObservation>>> {
        sink.emit(PipelineEvent::SourceLoaded {
            stage: Stage::EntityCleaning,
            source: raw.source_name.clone(),
            rows: raw.record_count(),
            columns: raw.headers.clone(),
        });

        for required in ["ticker", "date", "usdret"] {
            if !raw.has_column(required) {
                sink.emit(PipelineEvent::Warning {
                    stage: Stage::EntityCleaning,
                    message: format!(
                        "required column '{}' absent from {}; every row will be dropped",
                        required, raw.source_name
                    ),
                });
            }
        }

        let mut report = CleaningReport::new(Stage::EntityCleaning, raw.record_count());
        report.record_drops(DropReason::MalformedRecord, raw.malformed_lines.len());

        let mut seen = KeyDeduplicator::new();
        let mut rows = Vec::with_capacity(raw.rows.len());

        for row in &raw.rows {
            let obs = match self.parse_row(row) {
                Ok(obs) => obs,
                Err(reason) => {
                    report.record_drop(reason);
                    continue;
                }
            };

            if !seen.first_seen((obs.ticker.clone(), obs.date)) {
                report.record_drop(DropReason::DuplicateKey);
                continue;
            }

            rows.push(obs);
        }

        report.output_rows = rows.len();
        report.emit(sink);

        if rows.is_empty() {
            return Err(PanelError::empty(Stage::EntityCleaning.name()));
        }

        sink.emit(summarize(&rows));

        Ok(CleaningOutcome {
            table: rows,
            report,
        })
    }

    /// Typed parse of one row without the uniqueness check
    pub fn parse_row(&self, row: &RawEntityRow) -> std::result::Result<EntityObservation, DropReason> {
        let ticker = non_empty(row.ticker.as_deref()).ok_or(DropReason::MissingTicker)?;
        let date_raw = non_empty(row.date.as_deref()).ok_or(DropReason::MissingDate)?;
        let usdret_raw = non_empty(row.usdret.as_deref()).ok_or(DropReason::MissingReturn)?;

        let date = temporal::parse_date(date_raw).ok_or(DropReason::InvalidDate)?;
        let usdret = parse_number(Some(usdret_raw)).ok_or(DropReason::InvalidReturn)?;

        if usdret < self.config.return_min || usdret > self.config.return_max {
            return Err(DropReason::ReturnOutOfRange);
        }

        Ok(EntityObservation {
            ticker: ticker.to_uppercase(),
            date: temporal::month_end(date),
            usdret,
            ptype: non_empty(row.ptype.as_deref()).map(str::to_string),
            attributes: FinancialAttributes {
                market_equity: parse_number(row.market_equity.as_deref()),
                assets: parse_number(row.assets.as_deref()),
                sales: parse_number(row.sales.as_deref()),
                net_income: parse_number(row.net_income.as_deref()),
                book_equity: parse_number(row.book_equity.as_deref()),
                debt_at: parse_number(row.debt_at.as_deref()),
            },
        })
    }

    /// Load an already-cleaned entity file for the merge stage.
    ///
    /// Rows are parsed with the same checks but NOT de-duplicated: a duplicate
    /// key here is an upstream contract breach and must reach the merger's
    /// integrity check instead of being silently repaired.
    pub fn load_clean(
        &self,
        raw: RawTable<RawEntityRow>,
        sink: &mut dyn EventSink,
    ) -> Result<CleaningOutcome<Vec<EntityObservation>>> {
        sink.emit(PipelineEvent::SourceLoaded {
            stage: Stage::Merge,
            source: raw.source_name.clone(),
            rows: raw.record_count(),
            columns: raw.headers.clone(),
        });

        let mut report = CleaningReport::new(Stage::Merge, raw.record_count());
        report.record_drops(DropReason::MalformedRecord, raw.malformed_lines.len());

        let mut rows = Vec::with_capacity(raw.rows.len());
        for row in &raw.rows {
            match self.parse_row(row) {
                Ok(obs) => rows.push(obs),
                Err(reason) => report.record_drop(reason),
            }
        }
        report.output_rows = rows.len();

        for (reason, count) in &report.dropped {
            sink.emit(PipelineEvent::Warning {
                stage: Stage::Merge,
                message: format!(
                    "{} rows of cleaned entity file {} rejected ({})",
                    count,
                    raw.source_name,
                    reason.name()
                ),
            });
        }

        if rows.is_empty() {
            return Err(PanelError::empty("entity input"));
        }

        Ok(CleaningOutcome {
            table: rows,
            report,
        })
    }
}

impl Default for EntityCleaner {
    fn default() -> Self {
        Self::new(EntityCleanerConfig::default())
    }
}

fn summarize(rows: &[EntityObservation]) -> PipelineEvent {
    let mut tickers = KeyDeduplicator::new();
    for row in rows {
        tickers.first_seen(row.ticker.as_str());
    }
    let returns: Vec<f64> = rows.iter().map(|r| r.usdret).collect();
    let market_equity: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.attributes.market_equity)
        .collect();

    let mut ptype_counts = BTreeMap::new();
    for ptype in rows.iter().filter_map(|r| r.ptype.as_ref()) {
        *ptype_counts.entry(ptype.clone()).or_insert(0) += 1;
    }

    PipelineEvent::EntitySummary {
        unique_entities: tickers.unique_count(),
        observations: rows.len(),
        date_range: DateRange::from_dates(rows.iter().map(|r| r.date)),
        ptype_counts,
        usdret: stats::describe(&returns),
        market_equity: stats::describe(&market_equity),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::parser::{EntityCsvReader, SourceReader};
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn read(csv: &str) -> RawTable<RawEntityRow> {
        EntityCsvReader::new().read_from(csv.as_bytes(), "mem").unwrap()
    }

    #[test]
    fn test_clean_normalizes_ticker_and_date() {
        let raw = read("ticker,date,usdret,ptype,assets\n aaa ,2020-01-15,0.05,Office,abc\n");
        let mut sink = MemorySink::new();
        let outcome = EntityCleaner::default().clean(raw, &mut sink).unwrap();

        let row = &outcome.table[0];
        assert_eq!(row.ticker, "AAA");
        assert_eq!(row.date, ymd(2020, 1, 31));
        assert_eq!(row.ptype.as_deref(), Some("Office"));
        // Unparseable optional attribute is coerced to missing, the row survives
        assert_eq!(row.attributes.assets, None);
        assert_eq!(outcome.report.total_dropped(), 0);
    }

    #[test]
    fn test_clean_counts_each_drop_reason() {
        let raw = read(
            "ticker,date,usdret\n\
             AAA,2020-01-31,0.05\n\
             ,2020-01-31,0.01\n\
             BBB,,0.01\n\
             CCC,2020-01-31,\n\
             DDD,someday,0.01\n\
             EEE,2020-01-31,abc\n\
             FFF,2020-01-31,5.5\n\
             GGG,2020-01-31,-1.2\n\
             aaa,2020-01-02,0.07\n",
        );
        let mut sink = MemorySink::new();
        let outcome = EntityCleaner::default().clean(raw, &mut sink).unwrap();
        let report = &outcome.report;

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(report.count(DropReason::MissingTicker), 1);
        assert_eq!(report.count(DropReason::MissingDate), 1);
        assert_eq!(report.count(DropReason::MissingReturn), 1);
        assert_eq!(report.count(DropReason::InvalidDate), 1);
        assert_eq!(report.count(DropReason::InvalidReturn), 1);
        assert_eq!(report.count(DropReason::ReturnOutOfRange), 2);
        assert_eq!(report.count(DropReason::DuplicateKey), 1);
        assert!(report.is_consistent());
        assert_eq!(sink.dropped(Stage::EntityCleaning, DropReason::ReturnOutOfRange), 2);

        // First occurrence wins
        assert_eq!(outcome.table[0].usdret, 0.05);
    }

    #[test]
    fn test_return_bounds_are_inclusive() {
        let raw = read("ticker,date,usdret\nAAA,2020-01-31,-1.0\nAAA,2020-02-29,5.0\n");
        let outcome = EntityCleaner::default()
            .clean(raw, &mut MemorySink::new())
            .unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert!(outcome
            .table
            .iter()
            .all(|r| (-1.0..=5.0).contains(&r.usdret)));
    }

    #[test]
    fn test_missing_required_column_drops_everything() {
        let raw = read("ticker,date\nAAA,2020-01-31\n");
        let mut sink = MemorySink::new();
        let err = EntityCleaner::default().clean(raw, &mut sink).unwrap_err();

        assert!(matches!(err, PanelError::EmptyResult { .. }));
        assert!(sink.warnings().iter().any(|w| w.contains("usdret")));
        assert_eq!(sink.dropped(Stage::EntityCleaning, DropReason::MissingReturn), 1);
    }

    #[test]
    fn test_keys_unique_after_cleaning() {
        let raw = read(
            "ticker,date,usdret\nAAA,2020-01-01,0.1\nAAA,2020-01-31,0.2\nAAA,2020-02-01,0.3\nBBB,2020-01-15,0.4\n",
        );
        let outcome = EntityCleaner::default()
            .clean(raw, &mut MemorySink::new())
            .unwrap();

        let keys: HashSet<(String, NaiveDate)> = outcome
            .table
            .iter()
            .map(|r| (r.ticker.clone(), r.date))
            .collect();
        assert_eq!(keys.len(), outcome.table.len());
        assert_eq!(outcome.table.len(), 3);
    }

    #[test]
    fn test_load_clean_keeps_duplicates_for_merge_guard() {
        let raw = read("ticker,date,usdret\nAAA,2020-01-31,0.1\nAAA,2020-01-31,0.2\n");
        let outcome = EntityCleaner::default()
            .load_clean(raw, &mut MemorySink::new())
            .unwrap();
        assert_eq!(outcome.table.len(), 2);
    }

    #[test]
    fn test_summary_event() {
        let raw = read(
            "ticker,date,usdret,market_equity,ptype\n\
             AAA,2020-01-31,0.1,100,Office\n\
             BBB,2020-03-31,0.2,,Office\n\
             AAA,2020-02-29,0.3,300,Retail\n",
        );
        let mut sink = MemorySink::new();
        EntityCleaner::default().clean(raw, &mut sink).unwrap();

        let (unique_entities, date_range, ptype_counts, usdret, market_equity) = sink
            .events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::EntitySummary {
                    unique_entities,
                    date_range,
                    ptype_counts,
                    usdret,
                    market_equity,
                    ..
                } => Some((
                    *unique_entities,
                    *date_range,
                    ptype_counts.clone(),
                    usdret.clone(),
                    market_equity.clone(),
                )),
                _ => None,
            })
            .unwrap();
        assert_eq!(unique_entities, 2);
        let range = date_range.unwrap();
        assert_eq!(range.latest, ymd(2020, 3, 31));
        assert_eq!(range.month_span(), 3);
        assert_eq!(ptype_counts.get("Office"), Some(&2));
        assert_eq!(ptype_counts.get("Retail"), Some(&1));

        assert_eq!(usdret.count, 3);
        assert!((usdret.mean.unwrap() - 0.2).abs() < 1e-12);
        assert!((usdret.std.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(usdret.min, Some(0.1));
        assert_eq!(usdret.max, Some(0.3));

        // Missing market equity is left out of the description
        assert_eq!(market_equity.count, 2);
        assert_eq!(market_equity.mean, Some(200.0));
        assert_eq!(market_equity.q50, Some(200.0));
    }
}
