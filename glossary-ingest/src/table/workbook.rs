//! Excel workbook reader (first sheet only)

use super::SheetTable;
use calamine::{open_workbook_auto, Data, Reader};
use glossary_common::{Error, Result};
use std::path::Path;

pub(super) fn read_workbook(path: &Path) -> Result<SheetTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        Error::InvalidInput(format!("Cannot open workbook {}: {}", path.display(), e))
    })?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::InvalidInput("Excel file has no sheets".to_string()))?;
    tracing::info!(sheet = %sheet_name, "Using sheet");

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        Error::InvalidInput(format!("Cannot read sheet '{}': {}", sheet_name, e))
    })?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(|c| cell_text(c).trim().to_string()).collect(),
        None => return Ok(SheetTable::default()),
    };

    let rows = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok(SheetTable::new(headers, rows))
}

/// Render a cell as text; integral floats drop the `.0`
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("ReLU".into())), "ReLU");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Float(0.25)), "0.25");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }

    #[test]
    fn test_not_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(read_workbook(&path), Err(Error::InvalidInput(_))));
    }
}
