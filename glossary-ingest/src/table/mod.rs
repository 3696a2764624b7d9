//! Tabular sources
//!
//! Every input format (CSV, Excel workbook, JSON records) is loaded into a
//! [`SheetTable`]: one header row plus rows of text cells. Missing cells are
//! the empty string, so callers never have to distinguish "absent" from
//! "blank".

mod delimited;
mod records;
mod workbook;

pub use records::value_text;

use glossary_common::{Error, Result};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// On-disk table format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Excel,
    Json,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "xlsx" | "xls" | "xlsm" => Ok(TableFormat::Excel),
            "json" => Ok(TableFormat::Json),
            other => Err(Error::InvalidInput(format!(
                "Unsupported file type '.{}': {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TableFormat::Csv => "CSV",
            TableFormat::Excel => "Excel",
            TableFormat::Json => "JSON",
        }
    }
}

/// Header row plus text rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Parsed objects of a JSON records source, patched by `set_cell` and
    /// written back in place of the text rows
    records: Option<Vec<Map<String, Value>>>,
}

impl SheetTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            records: None,
        }
    }

    pub(crate) fn with_records(mut self, records: Vec<Map<String, Value>>) -> Self {
        self.records = Some(records);
        self
    }

    pub(crate) fn records(&self) -> Option<&[Map<String, Value>]> {
        self.records.as_deref()
    }

    /// Load a table, picking the reader from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }

        let table = match TableFormat::from_path(path)? {
            TableFormat::Csv => delimited::read_csv(path)?,
            TableFormat::Excel => workbook::read_workbook(path)?,
            TableFormat::Json => records::read_records(path)?,
        };

        tracing::debug!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Loaded table"
        );
        Ok(table)
    }

    /// Write the table in the format implied by `path`
    ///
    /// Excel output is not supported.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.write_as(TableFormat::from_path(path)?, path)
    }

    /// Write to `<path>.tmp`, then rename over `path`
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let format = TableFormat::from_path(path)?;
        let tmp = tmp_path(path);
        self.write_as(format, &tmp)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn write_as(&self, format: TableFormat, path: &Path) -> Result<()> {
        match format {
            TableFormat::Csv => delimited::write_csv(self, path),
            TableFormat::Json => records::write_records(self, path),
            TableFormat::Excel => Err(Error::InvalidInput(
                "Writing Excel files is not supported; use .csv or .json".to_string(),
            )),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Cell text, `""` when the row is shorter than the header
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Overwrite a cell, padding the row if needed
    pub fn set_cell(&mut self, row: usize, col: usize, value: String) {
        if let Some(r) = self.rows.get_mut(row) {
            if r.len() <= col {
                r.resize(col + 1, String::new());
            }
            if let (Some(records), Some(header)) = (self.records.as_mut(), self.headers.get(col)) {
                if let Some(record) = records.get_mut(row) {
                    record.insert(header.clone(), Value::String(value.clone()));
                }
            }
            r[col] = value;
        }
    }

    /// Term name of a row (column 0, trimmed)
    pub fn term(&self, row: usize) -> &str {
        self.cell(row, 0).trim()
    }

    /// Row as a JSON object keyed by header; blank cells become `null`
    /// when `blank_as_null` is set
    pub fn row_object(&self, row: usize, blank_as_null: bool) -> Map<String, Value> {
        let mut object = Map::new();
        for (col, header) in self.headers.iter().enumerate() {
            let text = self.cell(row, col).trim();
            let value = if text.is_empty() && blank_as_null {
                Value::Null
            } else {
                Value::String(text.to_string())
            };
            object.insert(header.clone(), value);
        }
        object
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
