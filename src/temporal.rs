// ⏰ Temporal Model - canonical month keys
//
// Every date in the pipeline is reduced to ONE representation before it is
// compared with anything: the last calendar day of its month.
//
//   2020-01-01  →  2020-01-31
//   2020-02-15  →  2020-02-29
//   2020-02-29  →  2020-02-29   (already canonical)
//
// Arithmetic on months goes through a dense month index (year * 12 + month0)
// so that "twelve months earlier" never depends on day-of-month.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date-only formats accepted by the cleaners, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Timestamp formats; only the date part is kept
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

// ============================================================================
// PARSING
// ============================================================================

/// Parse a raw date cell. Returns None for empty or unparseable input.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }

    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

// ============================================================================
// MONTH KEY
// ============================================================================

/// Canonical month key: last calendar day of the date's month
pub fn month_end(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// True when the date already is its own month key
pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == date
}

/// Dense month index: consecutive months differ by exactly 1
pub fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// Inverse of `month_index`, returning the month-end date
pub fn from_month_index(index: i32) -> Option<NaiveDate> {
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).map(month_end)
}

/// Month key `months` months before/after `date` (negative = earlier)
pub fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    month_index(date)
        .checked_add(months)
        .and_then(from_month_index)
}

/// Whole months from `from` to `to` (positive when `to` is later)
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    month_index(to) - month_index(from)
}

/// Every month key from `first` to `last` inclusive
pub fn month_range(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    (month_index(first)..=month_index(last))
        .filter_map(from_month_index)
        .collect()
}

// ============================================================================
// DATE RANGE
// ============================================================================

/// Earliest/latest date seen in a column, for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl DateRange {
    pub fn from_dates<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Option<Self> {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (earliest, latest) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(DateRange { earliest, latest })
    }

    /// Number of calendar months covered, both ends included
    pub fn month_span(&self) -> usize {
        (months_between(self.earliest, self.latest) + 1).max(0) as usize
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.earliest, self.latest)
    }
}

// ============================================================================
// TESTS
// ============================================================================
