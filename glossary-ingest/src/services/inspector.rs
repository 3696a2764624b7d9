//! Quick structural report for a glossary spreadsheet

use crate::parsing::SectionMap;
use crate::table::SheetTable;
use serde::Serialize;

const HEADER_PREVIEW: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionSummary {
    pub section: String,
    pub subsections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    pub total_columns: usize,
    pub total_rows: usize,
    pub headers: Vec<String>,
    pub sections: Vec<SectionSummary>,
    pub first_term: Option<String>,
    /// Non-empty `(header, value)` pairs of the first data row
    pub first_term_fields: Vec<(String, String)>,
}

pub fn inspect(table: &SheetTable) -> InspectionReport {
    let sections = SectionMap::from_headers(&table.headers)
        .sections()
        .iter()
        .map(|s| SectionSummary {
            section: s.name.clone(),
            subsections: s.subsections.len(),
        })
        .collect();

    let first_term_fields = if table.row_count() > 0 {
        table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(col, header)| {
                let value = table.cell(0, col).trim();
                (!value.is_empty()).then(|| (header.clone(), value.to_string()))
            })
            .collect()
    } else {
        Vec::new()
    };

    InspectionReport {
        total_columns: table.column_count(),
        total_rows: table.row_count(),
        headers: table.headers.iter().take(HEADER_PREVIEW).cloned().collect(),
        sections,
        first_term: (table.row_count() > 0).then(|| table.term(0).to_string()),
        first_term_fields,
    }
}
