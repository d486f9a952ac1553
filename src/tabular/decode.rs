//! CSV/JSON decoding for uploaded training files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::{Cell, TabularTable};

/// Supported upload formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn sniff(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('[') | Some('{') => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Errors raised while turning an uploaded file into a table.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("File {path} is {size} bytes; the upload limit is {max} bytes")]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("File is not valid UTF-8 text")]
    NotText,
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported JSON layout: {0}")]
    UnsupportedJson(&'static str),
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Read and decode `path`, refusing files larger than `max_bytes`.
pub fn decode_file(path: &Path, max_bytes: u64) -> Result<TabularTable, DecodeError> {
    let read_error = |source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(read_error)?.len();
    if size > max_bytes {
        return Err(DecodeError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: max_bytes,
        });
    }
    let bytes = std::fs::read(path).map_err(read_error)?;
    decode_bytes(&bytes, FileFormat::from_path(path))
}

/// Decode file contents. Without a format hint the content is sniffed.
pub fn decode_bytes(bytes: &[u8], format: Option<FileFormat>) -> Result<TabularTable, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotText)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    match format.unwrap_or_else(|| FileFormat::sniff(text)) {
        FileFormat::Csv => decode_csv(text),
        FileFormat::Json => decode_json(text),
    }
}

fn decode_csv(text: &str) -> Result<TabularTable, DecodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(detect_delimiter(text))
        .from_reader(text.as_bytes());
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        records.push(record);
    }
    let header = match records.first() {
        Some(first) if looks_like_header(first) => Some(records.remove(0)),
        _ => None,
    };
    let rows: Vec<Vec<Cell>> = records
        .iter()
        .map(|record| record.iter().map(field_cell).collect())
        .collect();
    let mut table = TabularTable::from_rows(rows);
    if let Some(header) = header {
        let width = table.column_count().max(header.len());
        table.columns = (0..width)
            .map(|index| {
                header
                    .get(index)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| super::default_column_name(index))
            })
            .collect();
    }
    Ok(table)
}

fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let tabs = first_line.matches('\t').count();
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if tabs > commas && tabs >= semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn field_cell(field: &str) -> Cell {
    if field.is_empty() {
        return Cell::Empty;
    }
    if field.eq_ignore_ascii_case("true") {
        return Cell::Bool(true);
    }
    if field.eq_ignore_ascii_case("false") {
        return Cell::Bool(false);
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Cell::Number(value),
        _ => Cell::Text(field.to_string()),
    }
}

/// A first record with text cells and no numeric or boolean cells names the columns.
fn looks_like_header(record: &csv::StringRecord) -> bool {
    let mut saw_text = false;
    for field in record {
        match field_cell(field) {
            Cell::Empty => {}
            Cell::Text(_) => saw_text = true,
            Cell::Number(_) | Cell::Bool(_) => return false,
        }
    }
    saw_text
}

fn decode_json(text: &str) -> Result<TabularTable, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(DecodeError::UnsupportedJson(
                    "expected an array or an object with a `data` array",
                ));
            }
        },
        _ => return Err(DecodeError::UnsupportedJson("expected an array of rows")),
    };
    if items.iter().all(Value::is_object) && !items.is_empty() {
        return Ok(table_from_objects(&items));
    }
    if items.iter().any(Value::is_object) {
        return Err(DecodeError::UnsupportedJson(
            "rows mix objects with arrays or scalars",
        ));
    }
    let rows = items
        .iter()
        .map(|item| match item {
            Value::Array(cells) => cells.iter().map(Cell::from_json).collect(),
            scalar => vec![Cell::from_json(scalar)],
        })
        .collect();
    Ok(TabularTable::from_rows(rows))
}

/// Objects become rows; the union of their keys, sorted, becomes the columns.
fn table_from_objects(items: &[Value]) -> TabularTable {
    let columns: Vec<String> = items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|object| object.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rows = items
        .iter()
        .filter_map(Value::as_object)
        .map(|object| {
            columns
                .iter()
                .map(|column| object.get(column).map(Cell::from_json).unwrap_or(Cell::Empty))
                .collect()
        })
        .collect();
    TabularTable { columns, rows }
}
