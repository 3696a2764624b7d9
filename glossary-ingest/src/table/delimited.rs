//! CSV reader and writer

use super::SheetTable;
use glossary_common::{Error, Result};
use std::path::Path;

fn csv_error(path: &Path, err: csv::Error) -> Error {
    Error::InvalidInput(format!("CSV error in {}: {}", path.display(), err))
}

/// Read a CSV file whose first record is the header row
pub(super) fn read_csv(path: &Path) -> Result<SheetTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(SheetTable::new(headers, rows))
}

pub(super) fn write_csv(table: &SheetTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(&table.headers)
        .map_err(|e| csv_error(path, e))?;

    let width = table.column_count();
    for row in 0..table.row_count() {
        let record: Vec<&str> = (0..width).map(|col| table.cell(row, col)).collect();
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }

    writer.flush()?;
    Ok(())
}
