//! Canonical row/column table shared by uploaded files and query results.

mod decode;
mod hits;

pub use decode::{DecodeError, FileFormat, decode_bytes, decode_file};
pub use hits::from_search_hits;

use serde::Serialize;
use thiserror::Error;

/// One scalar cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numeric view of the cell. Booleans count as 1/0 and numeric text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Empty => None,
        }
    }

    pub(crate) fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => {
                number.as_f64().map(Self::Number).unwrap_or(Self::Empty)
            }
            serde_json::Value::String(text) => Self::Text(text.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// Rows of cells plus the column identifiers they line up with.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TabularTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Training input: one `Vec<f64>` per row, one entry per selected column.
pub type NumericMatrix = Vec<Vec<f64>>;

/// Errors raised while projecting a table onto selected columns.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TabularError {
    #[error("Column {index} is out of range for a table with {column_count} columns")]
    ColumnOutOfRange { index: usize, column_count: usize },
    #[error("Column {index} is selected more than once")]
    DuplicateColumn { index: usize },
    #[error("Cell at row {row}, column '{column}' is not numeric")]
    NonNumericCell { row: usize, column: String },
}

impl TabularTable {
    /// Build a table, naming columns `column_<i>` after the widest row.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            columns: default_column_names(width),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        let widest = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        widest.max(self.columns.len())
    }

    /// Column identifier for `index`, falling back to the positional name.
    pub fn column_name(&self, index: usize) -> String {
        self.columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| default_column_name(index))
    }

    /// Check that every index in `selection` addresses a column of this table.
    pub fn check_selection(&self, selection: &[usize]) -> Result<(), TabularError> {
        let column_count = self.column_count();
        match selection.iter().find(|index| **index >= column_count) {
            Some(&index) => Err(TabularError::ColumnOutOfRange {
                index,
                column_count,
            }),
            None => Ok(()),
        }
    }
}

pub(crate) fn default_column_name(index: usize) -> String {
    format!("column_{index}")
}

fn default_column_names(count: usize) -> Vec<String> {
    (0..count).map(default_column_name).collect()
}

/// Project `table` onto `selection`, in selection order, coercing cells to numbers.
///
/// An empty table or empty selection produces an empty matrix. Rows shorter
/// than a selected index read that cell as empty.
pub fn extract_input(
    table: &TabularTable,
    selection: &[usize],
) -> Result<NumericMatrix, TabularError> {
    if table.rows.is_empty() || selection.is_empty() {
        return Ok(Vec::new());
    }
    table.check_selection(selection)?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            selection
                .iter()
                .map(|&column| {
                    row.get(column)
                        .and_then(Cell::as_number)
                        .ok_or_else(|| TabularError::NonNumericCell {
                            row: row_index,
                            column: table.column_name(column),
                        })
                })
                .collect::<Result<Vec<f64>, _>>()
        })
        .collect()
}
