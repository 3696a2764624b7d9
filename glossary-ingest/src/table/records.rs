//! JSON records (array of objects) reader and writer

use super::SheetTable;
use glossary_common::{Error, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read an array of objects; headers are the keys of the first record
pub(super) fn read_records(path: &Path) -> Result<SheetTable> {
    let reader = BufReader::new(File::open(path)?);
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| Error::InvalidInput(format!("Invalid JSON in {}: {}", path.display(), e)))?;

    let records = value.as_array().ok_or_else(|| {
        Error::InvalidInput(format!("{} is not a JSON array of records", path.display()))
    })?;

    let headers: Vec<String> = match records.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        Some(_) => {
            return Err(Error::InvalidInput(
                "JSON records must be objects".to_string(),
            ))
        }
        None => return Ok(SheetTable::default()),
    };

    let mut rows = Vec::with_capacity(records.len());
    let mut objects = Vec::with_capacity(records.len());
    for record in records {
        let object = record.as_object().ok_or_else(|| {
            Error::InvalidInput("JSON records must be objects".to_string())
        })?;
        rows.push(
            headers
                .iter()
                .map(|h| object.get(h).map(value_text).unwrap_or_default())
                .collect(),
        );
        objects.push(object.clone());
    }

    Ok(SheetTable::new(headers, rows).with_records(objects))
}

/// Write the table as an array of objects
///
/// A table read from JSON records writes its source objects back, so keys
/// outside the header and non-string values survive; only cells set
/// through `set_cell` change.
pub(super) fn write_records(table: &SheetTable, path: &Path) -> Result<()> {
    if let Some(source) = table.records().filter(|r| r.len() == table.row_count()) {
        return write_pretty(path, source);
    }

    let records: Vec<Value> = (0..table.row_count())
        .map(|row| {
            let object: Map<String, Value> = table
                .headers
                .iter()
                .enumerate()
                .map(|(col, h)| (h.clone(), Value::String(table.cell(row, col).to_string())))
                .collect();
            Value::Object(object)
        })
        .collect();
    write_pretty(path, &records)
}

fn write_pretty<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Scalar as text; `null` is blank, nested values keep their JSON text
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
