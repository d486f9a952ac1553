//! The two ways of supplying training input and the state each one carries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tabular::{TabularError, TabularTable};

/// Which ingestion mode feeds the request builder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceMode {
    #[default]
    Upload,
    Query,
}

impl DataSourceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for DataSourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "query" => Ok(Self::Query),
            other => Err(format!("Unknown data source '{other}' (expected upload or query)")),
        }
    }
}

/// A file chosen for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Display name, usually the file name.
    pub name: String,
    pub path: PathBuf,
    /// Size on disk, 0 when unreadable.
    pub size_bytes: u64,
}

impl FileInfo {
    /// Describe `path`, reading its size from disk when available.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let size_bytes = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        Self {
            name,
            path: path.to_path_buf(),
            size_bytes,
        }
    }
}

/// Upload-mode state: chosen files, the decoded table, and the selected columns.
///
/// The column selection is only meaningful against the current table, so every
/// table replacement clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadState {
    files: Vec<FileInfo>,
    table: TabularTable,
    selected_columns: Vec<usize>,
    decode_error: Option<String>,
}

impl UploadState {
    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Decoded table, empty until a decode succeeds.
    pub fn table(&self) -> &TabularTable {
        &self.table
    }

    pub fn selected_columns(&self) -> &[usize] {
        &self.selected_columns
    }

    /// Message from the last failed decode, if the current table came from one.
    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    /// Replace the file list; the old table and selection no longer apply.
    pub fn set_files(&mut self, files: Vec<FileInfo>) {
        self.files = files;
        self.reset_table();
    }

    /// Install a freshly decoded table and drop the old selection.
    pub fn set_table(&mut self, table: TabularTable) {
        self.table = table;
        self.selected_columns.clear();
        self.decode_error = None;
    }

    /// Record a failed decode: no training input until a valid file arrives.
    pub fn set_decode_failed(&mut self, message: String) {
        self.reset_table();
        self.decode_error = Some(message);
    }

    pub fn reset_table(&mut self) {
        self.table = TabularTable::default();
        self.selected_columns.clear();
        self.decode_error = None;
    }

    /// Forget the selected columns but keep the table.
    pub fn clear_selection(&mut self) {
        self.selected_columns.clear();
    }

    /// Select columns of the current table, in the given order.
    pub fn select_columns(&mut self, columns: Vec<usize>) -> Result<(), TabularError> {
        self.table.check_selection(&columns)?;
        let mut seen = BTreeSet::new();
        if let Some(&index) = columns.iter().find(|index| !seen.insert(**index)) {
            return Err(TabularError::DuplicateColumn { index });
        }
        self.selected_columns = columns;
        Ok(())
    }

    /// Names of the selected columns, in selection order.
    pub fn selected_column_names(&self) -> Vec<String> {
        self.selected_columns
            .iter()
            .map(|&index| self.table.column_name(index))
            .collect()
    }
}

/// Query-mode state: fields picked per index pattern plus the query body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySelection {
    /// Selected field names keyed by index pattern.
    pub fields: BTreeMap<String, Vec<String>>,
    /// Query DSL body sent as `query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
}

impl QuerySelection {
    /// Index patterns with at least one selected field.
    pub fn indices(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(index, _)| index.clone())
            .collect()
    }

    /// Every selected field across index patterns, first occurrence wins.
    pub fn all_fields(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.fields
            .values()
            .flatten()
            .filter(|field| seen.insert(field.as_str()))
            .cloned()
            .collect()
    }

    /// At least one field is selected somewhere.
    pub fn has_fields(&self) -> bool {
        self.fields.values().any(|fields| !fields.is_empty())
    }
}
