//! Format conversion between Excel, CSV and JSON records

use crate::table::{SheetTable, TableFormat};
use glossary_common::{Error, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

const SUPPORTED: &str = "Supported conversions: Excel (.xlsx/.xls) → CSV, \
     Excel (.xlsx/.xls) → JSON, CSV → JSON, JSON → CSV";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub success: bool,
    pub input: String,
    pub output: String,
    pub rows: usize,
    pub columns: usize,
    /// Size of the written file in bytes
    pub output_bytes: u64,
    /// Row/column counts re-read from the output when validation was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<ValidationReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub columns: usize,
}

fn check_pair(from: TableFormat, to: TableFormat) -> Result<()> {
    use TableFormat::*;
    match (from, to) {
        (Excel, Csv) | (Excel, Json) | (Csv, Json) | (Json, Csv) => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "Unsupported conversion: {} → {}. {}",
            from.name(),
            to.name(),
            SUPPORTED
        ))),
    }
}

pub fn convert(input: &Path, output: &Path, validate: bool) -> Result<ConversionSummary> {
    let from = TableFormat::from_path(input)?;
    let to = TableFormat::from_path(output)?;
    check_pair(from, to)?;

    info!(input = %input.display(), output = %output.display(), "Converting {} to {}", from.name(), to.name());
    let table = SheetTable::load(input)?;
    table.save(output)?;

    let output_bytes = std::fs::metadata(output)?.len();
    info!(rows = table.row_count(), columns = table.column_count(), output_bytes, "Conversion complete");

    let validated = if validate {
        let written = SheetTable::load(output)?;
        Some(ValidationReport {
            rows: written.row_count(),
            columns: written.column_count(),
        })
    } else {
        None
    };

    Ok(ConversionSummary {
        success: true,
        input: input.display().to_string(),
        output: output.display().to_string(),
        rows: table.row_count(),
        columns: table.column_count(),
        output_bytes,
        validated,
    })
}
