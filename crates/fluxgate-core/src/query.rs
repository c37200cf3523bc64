//! Query result model
//!
//! Mirrors the JSON body of the `/query` endpoint:
//!
//! ```json
//! {"results":[{"statement_id":0,"series":[
//!     {"name":"cpu","columns":["time","load"],"values":[[1700000000000,0.75]]}
//! ]}]}
//! ```
//!
//! `series` and `values` are omitted by the server when a statement matches
//! nothing, so both default to empty.

use crate::error::{CoreError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Result of folding two-column rows: first cell (as text) -> second cell.
/// Iteration follows first insertion; a repeated key keeps its position and
/// takes the later value.
pub type ReadMap = IndexMap<String, Value>;

/// Width the `time` header is padded to in reports
const TIME_HEADER_WIDTH: usize = 30;
const RULE_HEAVY: &str = "===================================================";
const RULE_LIGHT: &str = "---------------------------------------------------";

/// Whole response of one query request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one statement within a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One named series: a column list and positional rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<Value>>,
}

impl QueryResponse {
    /// Parse a response body
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Turn a request-level or statement-level error into `Err`
    pub fn into_result(self) -> Result<Self> {
        if let Some(error) = &self.error {
            return Err(CoreError::Statement(error.clone()));
        }
        if let Some(error) = self.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(CoreError::Statement(error.clone()));
        }
        Ok(self)
    }

    /// Every series across every statement, in response order
    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.results.iter().flat_map(|r| r.series.iter())
    }
}

/// Fold every row into `first cell -> second cell`.
///
/// Rows with fewer than two cells carry no pair and are skipped; cells past
/// the second are ignored.
pub fn fold_pairs(response: &QueryResponse) -> ReadMap {
    let mut map = ReadMap::new();
    for series in response.series() {
        for row in &series.values {
            if let [key, value, ..] = row.as_slice() {
                map.insert(cell_text(key), value.clone());
            }
        }
    }
    map
}

/// Column names of every series, concatenated without deduplication
pub fn column_names(response: &QueryResponse) -> Vec<String> {
    response
        .series()
        .flat_map(|s| s.columns.iter().cloned())
        .collect()
}

/// First cell of every row as text, e.g. the names from `SHOW DATABASES`
pub fn first_column_strings(response: &QueryResponse) -> Vec<String> {
    response
        .series()
        .flat_map(|s| s.values.iter())
        .filter_map(|row| row.first().map(cell_text))
        .collect()
}

/// Render a cell the way it reads in a report: strings bare, null empty
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render every series as a fixed-layout text table
pub fn render_report(response: &QueryResponse) -> String {
    let mut out = String::new();
    for series in response.series() {
        render_series(&mut out, series);
    }
    out
}

fn render_series(out: &mut String, series: &Series) {
    out.push_str(&format!("{}\n", RULE_HEAVY));
    out.push_str(&format!("              {}\n", series.name));
    out.push_str(&format!("{}\n", RULE_LIGHT));

    for column in &series.columns {
        if column == "time" {
            out.push_str(&format!("{:<width$}", column, width = TIME_HEADER_WIDTH));
        } else {
            out.push_str(&format!("{}\t", column));
        }
    }
    out.push('\n');
    out.push_str(&format!("{}\n", RULE_LIGHT));

    for row in &series.values {
        for (i, cell) in row.iter().enumerate() {
            let sep = if i == 0 { "\t" } else { "\t\t" };
            out.push_str(&cell_text(cell));
            out.push_str(sep);
        }
        out.push('\n');
    }
    out.push_str(&format!("{}\n", RULE_HEAVY));
}
