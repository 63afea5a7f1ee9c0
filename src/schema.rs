// 📐 Shape Layer - typed rows for both sources and the merged panel
//
// Every table in the pipeline has a fixed schema. Cells are parsed once into
// these structs; anything that does not fit is dropped by the cleaners with a
// reason, never coerced into a placeholder value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// COLUMN REGISTRY
// ============================================================================

/// Entity panel columns, in output order
pub const ENTITY_COLUMNS: [&str; 10] = [
    "ticker",
    "date",
    "usdret",
    "market_equity",
    "ptype",
    "assets",
    "sales",
    "net_income",
    "book_equity",
    "debt_at",
];

/// Optional numeric attributes of an entity row, in output order
pub const FINANCIAL_ATTRIBUTES: [&str; 6] = [
    "market_equity",
    "assets",
    "sales",
    "net_income",
    "book_equity",
    "debt_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Identifier,
    Date,
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnKind,
    /// Required columns can never be missing in a cleaned row
    pub required: bool,
}

impl ColumnDefinition {
    fn new(name: &str, kind: ColumnKind, required: bool) -> Self {
        ColumnDefinition {
            name: name.to_string(),
            kind,
            required,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }
}

/// Schema of the cleaned entity table
pub fn entity_schema() -> Vec<ColumnDefinition> {
    ENTITY_COLUMNS
        .iter()
        .map(|name| match *name {
            "ticker" => ColumnDefinition::new(name, ColumnKind::Identifier, true),
            "date" => ColumnDefinition::new(name, ColumnKind::Date, true),
            "usdret" => ColumnDefinition::new(name, ColumnKind::Numeric, true),
            "ptype" => ColumnDefinition::new(name, ColumnKind::Categorical, false),
            _ => ColumnDefinition::new(name, ColumnKind::Numeric, false),
        })
        .collect()
}

/// Schema of a cleaned indicator table with the given value columns
pub fn indicator_schema(columns: &[String]) -> Vec<ColumnDefinition> {
    let mut schema = vec![ColumnDefinition::new("date", ColumnKind::Date, true)];
    schema.extend(
        columns
            .iter()
            .map(|c| ColumnDefinition::new(c, ColumnKind::Numeric, true)),
    );
    schema
}

// ============================================================================
// CELLS
// ============================================================================

/// One cell of a typed row, used by the writer, missingness and statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Date(NaiveDate),
    Number(f64),
    Missing,
}

impl Cell<'_> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn from_option(value: Option<f64>) -> Self {
        value.map_or(Cell::Missing, Cell::Number)
    }
}

// ============================================================================
// ENTITY OBSERVATION
// ============================================================================

/// Optional financial attributes, each independently nullable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialAttributes {
    pub market_equity: Option<f64>,
    pub assets: Option<f64>,
    pub sales: Option<f64>,
    pub net_income: Option<f64>,
    pub book_equity: Option<f64>,
    pub debt_at: Option<f64>,
}

/// One entity-month: ticker + canonical month + bounded return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityObservation {
    pub ticker: String,
    pub date: NaiveDate,
    pub usdret: f64,
    pub ptype: Option<String>,
    pub attributes: FinancialAttributes,
}

impl EntityObservation {
    pub fn new(ticker: impl Into<String>, date: NaiveDate, usdret: f64) -> Self {
        EntityObservation {
            ticker: ticker.into(),
            date,
            usdret,
            ptype: None,
            attributes: FinancialAttributes::default(),
        }
    }

    pub fn with_ptype(mut self, ptype: impl Into<String>) -> Self {
        self.ptype = Some(ptype.into());
        self
    }

    pub fn with_attributes(mut self, attributes: FinancialAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// (ticker, month) join/uniqueness key
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.ticker, self.date)
    }

    /// Cells in `ENTITY_COLUMNS` order
    pub fn cells(&self) -> Vec<Cell<'_>> {
        let a = &self.attributes;
        vec![
            Cell::Text(&self.ticker),
            Cell::Date(self.date),
            Cell::Number(self.usdret),
            Cell::from_option(a.market_equity),
            self.ptype.as_deref().map_or(Cell::Missing, Cell::Text),
            Cell::from_option(a.assets),
            Cell::from_option(a.sales),
            Cell::from_option(a.net_income),
            Cell::from_option(a.book_equity),
            Cell::from_option(a.debt_at),
        ]
    }
}

// ============================================================================
// INDICATOR TABLE
// ============================================================================

/// One month of indicator values, aligned to `IndicatorTable::columns`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorObservation {
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

impl IndicatorObservation {
    pub fn new(date: NaiveDate, values: Vec<f64>) -> Self {
        IndicatorObservation { date, values }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTable {
    pub columns: Vec<String>,
    pub rows: Vec<IndicatorObservation>,
}

impl IndicatorTable {
    pub fn new(columns: Vec<String>) -> Self {
        IndicatorTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<IndicatorObservation>) -> Self {
        IndicatorTable { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn months(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }

    /// Values of one column, in row order
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|r| r.values.get(index).copied())
            .collect()
    }
}

// ============================================================================
// PANEL
// ============================================================================

/// One merged entity-month. `indicators` is all-or-nothing by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub entity: EntityObservation,
    pub indicators: Option<Vec<f64>>,
}

impl PanelRow {
    pub fn is_matched(&self) -> bool {
        self.indicators.is_some()
    }

    /// Entity cells followed by `indicator_count` indicator cells
    pub fn cells(&self, indicator_count: usize) -> Vec<Cell<'_>> {
        let mut cells = self.entity.cells();
        match &self.indicators {
            Some(values) => cells.extend(values.iter().map(|v| Cell::Number(*v))),
            None => cells.extend(std::iter::repeat(Cell::Missing).take(indicator_count)),
        }
        cells
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub indicator_columns: Vec<String>,
    pub rows: Vec<PanelRow>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Full output schema: entity columns then indicator columns
    pub fn schema(&self) -> Vec<ColumnDefinition> {
        let mut schema = entity_schema();
        schema.extend(
            self.indicator_columns
                .iter()
                .map(|c| ColumnDefinition::new(c, ColumnKind::Numeric, false)),
        );
        schema
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema().into_iter().map(|c| c.name).collect()
    }

    pub fn matched_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_matched()).count()
    }

    /// Sort by (ticker, month). Stable, so repeated keys keep input order.
    pub fn sort_canonical(&mut self) {
        self.rows.sort_by(|a, b| a.entity.key().cmp(&b.entity.key()));
    }
}

// ============================================================================
// TESTS
// ============================================================================
