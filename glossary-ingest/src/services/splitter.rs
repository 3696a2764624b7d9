//! Chunked JSON exports
//!
//! `split_dataset` breaks a processed dataset into per-collection chunk
//! files for incremental loading; `export_raw_chunks` dumps spreadsheet
//! rows as JSON so very large workbooks can be handed off in pieces.

use crate::table::SheetTable;
use glossary_common::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub const DEFAULT_SPLIT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_RAW_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitSummary {
    pub success: bool,
    pub chunks_created: usize,
    pub output_dir: String,
    pub total_categories: usize,
    pub total_subcategories: usize,
    pub total_terms: usize,
}

/// Split `{categories, subcategories, terms}` into `<collection>_chunk_<n>.json`
///
/// Items are copied as-is so datasets with extra fields survive the split.
pub fn split_dataset(input: &Path, output_dir: &Path, chunk_size: usize) -> Result<SplitSummary> {
    if chunk_size == 0 {
        return Err(Error::InvalidInput("chunk size must be positive".to_string()));
    }
    if !input.exists() {
        return Err(Error::NotFound(format!("Input not found: {}", input.display())));
    }

    info!(input = %input.display(), output_dir = %output_dir.display(), chunk_size, "Splitting dataset");
    std::fs::create_dir_all(output_dir)?;

    let content = std::fs::read_to_string(input)?;
    let data: Value = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Invalid dataset JSON: {}", e)))?;

    let mut chunks_created = 0;
    for name in ["categories", "subcategories", "terms"] {
        let items = collection(&data, name);
        for (idx, chunk) in items.chunks(chunk_size).enumerate() {
            let path = output_dir.join(format!("{}_chunk_{}.json", name, idx + 1));
            super::write_json(&path, &json!({ name: chunk }))?;
            info!(collection = name, chunk = idx + 1, items = chunk.len(), "Created chunk");
            chunks_created += 1;
        }
    }

    let summary = SplitSummary {
        success: true,
        chunks_created,
        output_dir: output_dir.display().to_string(),
        total_categories: collection(&data, "categories").len(),
        total_subcategories: collection(&data, "subcategories").len(),
        total_terms: collection(&data, "terms").len(),
    };
    info!(chunks = chunks_created, "Dataset split complete");
    Ok(summary)
}

fn collection<'a>(data: &'a Value, name: &str) -> &'a [Value] {
    data.get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawExportSummary {
    pub total_chunks: usize,
    pub total_rows: usize,
    pub chunk_size: usize,
    pub source_file: String,
    pub processing_time: f64,
    pub column_count: usize,
}

/// Dump table rows to `chunk_0001.json`, ... plus `headers.json` and
/// `metadata.json`
///
/// Rows with a blank term are dropped and chunks left empty are not
/// written, but they still count towards `total_chunks`.
pub fn export_raw_chunks(
    table: &SheetTable,
    source_file: &str,
    output_dir: &Path,
    chunk_size: usize,
) -> Result<RawExportSummary> {
    if chunk_size == 0 {
        return Err(Error::InvalidInput("chunk size must be positive".to_string()));
    }
    let started = Instant::now();
    std::fs::create_dir_all(output_dir)?;

    super::write_json(&output_dir.join("headers.json"), &table.headers)?;

    let mut total_chunks = 0;
    let mut total_rows = 0;
    let row_indices: Vec<usize> = (0..table.row_count()).collect();
    for chunk in row_indices.chunks(chunk_size) {
        total_chunks += 1;
        let records: Vec<Value> = chunk
            .iter()
            .filter(|&&row| !table.term(row).is_empty())
            .map(|&row| Value::Object(table.row_object(row, true)))
            .collect();
        if records.is_empty() {
            continue;
        }

        let path = output_dir.join(format!("chunk_{:04}.json", total_chunks));
        super::write_json(&path, &records)?;
        total_rows += records.len();
        info!(chunk = total_chunks, rows = records.len(), total_rows, "Saved raw chunk");
    }

    let summary = RawExportSummary {
        total_chunks,
        total_rows,
        chunk_size,
        source_file: source_file.to_string(),
        processing_time: started.elapsed().as_secs_f64(),
        column_count: table.column_count(),
    };
    super::write_json(&output_dir.join("metadata.json"), &summary)?;
    Ok(summary)
}
