//! Missing-cell discovery and prompt construction

use super::checkpoint::Checkpoint;
use crate::table::SheetTable;
use glossary_common::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const SYSTEM_PROMPT: &str = "You are an AI/ML educational content assistant.";

/// Order in which missing cells are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillOrder {
    #[default]
    TopDown,
    BottomUp,
}

impl FromStr for FillOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topdown" => Ok(FillOrder::TopDown),
            "bottomup" => Ok(FillOrder::BottomUp),
            other => Err(Error::InvalidInput(format!(
                "Unknown fill mode '{}' (expected topdown or bottomup)",
                other
            ))),
        }
    }
}

/// One empty cell to generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTask {
    /// Spreadsheet row number (data index + 2)
    pub row: usize,
    pub col: usize,
    pub term: String,
    pub section: String,
}

impl CellTask {
    pub fn data_index(&self) -> usize {
        self.row - 2
    }

    pub fn user_prompt(&self) -> String {
        user_prompt(&self.term, &self.section)
    }
}

pub fn user_prompt(term: &str, section: &str) -> String {
    format!(
        "You are an AI/ML educational content assistant. For the term \"{}\", please write only the content for this section:\n\n\"{}\"\n\nDo not include any extra headings or formatting—just the prose, concise enough to fit in one spreadsheet cell.",
        term, section
    )
}

/// Every empty content cell not yet checkpointed
///
/// Rows without a term and columns without a header are skipped. A cell
/// holding only whitespace counts as filled.
pub fn find_missing_cells(
    table: &SheetTable,
    checkpoint: &Checkpoint,
    order: FillOrder,
) -> Vec<CellTask> {
    let mut tasks = Vec::new();

    for index in 0..table.row_count() {
        let term = table.term(index);
        if term.is_empty() {
            continue;
        }
        let row = index + 2;

        for (col, header) in table.headers.iter().enumerate().skip(1) {
            let section = header.trim();
            if section.is_empty() || checkpoint.contains(row, col) {
                continue;
            }
            if !table.cell(index, col).is_empty() {
                continue;
            }
            tasks.push(CellTask {
                row,
                col,
                term: term.to_string(),
                section: section.to_string(),
            });
        }
    }

    if order == FillOrder::BottomUp {
        tasks.reverse();
    }
    tasks
}
