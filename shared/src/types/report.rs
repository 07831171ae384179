//! Report data as returned by the reporting backend
//!
//! A [`ReportTable`] is a flat list of rows, each row a map from column
//! name to JSON value. The `label` column identifies the row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Label column every report row carries.
pub const LABEL_COLUMN: &str = "label";

/// Label given to the row that [`ReportTable::truncate`] folds the rest into.
pub const SUMMARY_ROW_LABEL: &str = "Others";

/// Whether the archive a table was built from has finished computing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveState {
    Complete,
    /// The backend did not report a state. Treated as complete.
    #[default]
    Absent,
    /// Any reported state other than complete.
    #[serde(other)]
    Incomplete,
}

/// A single report row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter, mostly for fixtures and tests.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.insert(column.to_string(), value.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    /// Row label rendered as a string. Numeric labels are formatted.
    pub fn label(&self) -> String {
        match self.columns.get(LABEL_COLUMN) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn sort_key(&self, column: &str) -> f64 {
        self.columns
            .get(column)
            .and_then(numeric_cell)
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Fold rows into one: numeric columns are summed, any other column
    /// keeps the value of the first row that has it. Numbers the backend
    /// sent as strings count as numeric.
    fn summarize(rows: Vec<Row>) -> Row {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut summary = Row::new();

        for row in rows {
            for (name, value) in row.columns {
                if name == LABEL_COLUMN {
                    continue;
                }
                match numeric_cell(&value) {
                    Some(n) => *sums.entry(name).or_insert(0.0) += n,
                    None => {
                        if !sums.contains_key(&name) {
                            summary.columns.entry(name).or_insert(value);
                        }
                    }
                }
            }
        }

        for (name, total) in sums {
            let value = serde_json::Number::from_f64(total)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            summary.columns.insert(name, value);
        }
        summary
            .columns
            .insert(LABEL_COLUMN.to_string(), Value::from(SUMMARY_ROW_LABEL));
        summary
    }
}

/// Numeric reading of a cell. Strings such as `"12"`, `"4.5%"` or `"30s"`
/// are numbers with a unit suffix.
fn numeric_cell(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches(&['%', 's'][..])
            .trim_end()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Tabular report result for one (report, site, period, date).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    #[serde(default)]
    pub rows: Vec<Row>,

    #[serde(default)]
    pub archive_state: ArchiveState,
}

impl ReportTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            archive_state: ArchiveState::Absent,
        }
    }

    pub fn with_archive_state(mut self, state: ArchiveState) -> Self {
        self.archive_state = state;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Keep only rows for which `keep` returns true, preserving order.
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Rank rows descending by `sort_column`, keep the first `limit` and fold
    /// the remainder into a single summary row appended at the end.
    pub fn truncate(&mut self, limit: usize, sort_column: &str) {
        if self.rows.len() <= limit {
            return;
        }

        self.rows
            .sort_by(|a, b| b.sort_key(sort_column).total_cmp(&a.sort_key(sort_column)));

        let rest = self.rows.split_off(limit);
        self.rows.push(Row::summarize(rest));
    }
}

/// Catalog entry describing how to query a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub module: String,
    pub action: String,
    pub name: String,

    /// Extra request parameters merged into every query for this report.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Metric columns the report provides.
    #[serde(default)]
    pub metrics: Vec<String>,
}

impl ReportMetadata {
    /// `Module.action` method name.
    pub fn method(&self) -> String {
        format!("{}.{}", self.module, self.action)
    }

    pub fn has_metric(&self, metric: &str) -> bool {
        self.metrics.iter().any(|m| m == metric)
    }
}
