//! Glossary data pipeline services
//!
//! Spreadsheet → structured dataset → chunk files → database, plus the
//! format converter and inspector used to prepare source files.

pub mod converter;
pub mod dataset_importer;
pub mod dataset_processor;
pub mod incremental_importer;
pub mod inspector;
pub mod splitter;

pub use converter::{convert, ConversionSummary};
pub use dataset_importer::{import_dataset, DatasetImportSummary};
pub use dataset_processor::{process_file, process_table, ProcessOptions, ProcessingSummary};
pub use incremental_importer::{
    apply_changes, execute_sql_file, ImportOptions, ImportPlan, ImportSummary, IncrementalImporter,
};
pub use inspector::{inspect, InspectionReport};
pub use splitter::{export_raw_chunks, split_dataset, RawExportSummary, SplitSummary};

use glossary_common::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `value` as pretty JSON, creating parent directories
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
