//! Spreadsheet → structured glossary dataset
//!
//! Each non-blank row becomes a term. Categories and subcategories are
//! derived from the category columns (tag lists or prose) and deduplicated
//! by cleaned name; the remaining columns are kept as structured sections.

use crate::models::{
    DatasetCategory, DatasetMetadata, DatasetSubcategory, DatasetTerm, ProcessedDataset,
};
use crate::parsing::{
    clean_category_name, extract_category_from_text, extract_subcategories_from_text,
    is_tag_list, KeyColumns, SectionMap,
};
use crate::table::SheetTable;
use chrono::Utc;
use glossary_common::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Characters kept in `short_definition`
const SHORT_DEFINITION_CHARS: usize = 200;
const TAG_CATEGORY_PARTS: usize = 3;
const TAG_SUBCATEGORY_PARTS: usize = 5;

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ProcessOptions {
    /// Rows per chunk
    pub chunk_size: usize,
    /// Stop after this many chunks (ignored when 0)
    pub max_chunks: Option<usize>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_chunks: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub success: bool,
    pub categories: usize,
    pub subcategories: usize,
    pub terms: usize,
    pub chunks_processed: usize,
    pub output_path: String,
}

/// Accumulates categories/subcategories across rows
#[derive(Default)]
struct DatasetBuilder {
    categories: Vec<DatasetCategory>,
    category_ids: HashMap<String, String>,
    subcategories: Vec<DatasetSubcategory>,
    subcategory_ids: HashMap<(String, String), String>,
    terms: Vec<DatasetTerm>,
}

impl DatasetBuilder {
    fn category_id(&mut self, name: String) -> String {
        if let Some(id) = self.category_ids.get(&name) {
            return id.clone();
        }
        let id = Uuid::new_v4().to_string();
        self.category_ids.insert(name.clone(), id.clone());
        self.categories.push(DatasetCategory { id: id.clone(), name });
        id
    }

    fn subcategory_id(&mut self, category_id: &str, name: String) -> String {
        let key = (category_id.to_string(), name);
        if let Some(id) = self.subcategory_ids.get(&key) {
            return id.clone();
        }
        let id = Uuid::new_v4().to_string();
        self.subcategories.push(DatasetSubcategory {
            id: id.clone(),
            name: key.1.clone(),
            category_id: key.0.clone(),
        });
        self.subcategory_ids.insert(key, id.clone());
        id
    }
}

/// Process a loaded table, reporting `(chunk, total_chunks)` after each chunk
pub fn process_table(
    table: &SheetTable,
    source_file: &str,
    options: &ProcessOptions,
    mut on_chunk: impl FnMut(usize, usize),
) -> ProcessedDataset {
    let section_map = SectionMap::from_headers(&table.headers);
    info!(sections = section_map.len(), "Found main sections");
    for section in section_map.sections() {
        debug!(section = %section.name, subsections = section.subsections.len(), "Section");
    }
    let keys = KeyColumns::detect(&section_map);

    let chunk_size = options.chunk_size.max(1);
    let available = table.row_count().div_ceil(chunk_size);
    let total_chunks = match options.max_chunks {
        Some(max) if max > 0 && max < available => {
            info!(max, available, "Limiting chunks");
            max
        }
        _ => available,
    };

    let mut builder = DatasetBuilder::default();
    for chunk in 0..total_chunks {
        let start = chunk * chunk_size;
        let end = (start + chunk_size).min(table.row_count());
        for row in start..end {
            if let Some(term) = build_term(table, row, &section_map, &keys, &mut builder) {
                builder.terms.push(term);
            }
        }

        let done = chunk + 1;
        if done % 5 == 0 {
            info!(
                terms = builder.terms.len(),
                chunks = done,
                "Processed {} terms in {} chunks",
                builder.terms.len(),
                done
            );
        }
        on_chunk(done, total_chunks);
    }

    info!(
        terms = builder.terms.len(),
        categories = builder.categories.len(),
        subcategories = builder.subcategories.len(),
        "Processing complete"
    );

    ProcessedDataset {
        categories: builder.categories,
        subcategories: builder.subcategories,
        terms: builder.terms,
        metadata: Some(DatasetMetadata {
            source_file: source_file.to_string(),
            processed_at: Utc::now(),
            total_rows: table.row_count(),
            chunk_size,
            chunks_processed: total_chunks,
        }),
    }
}

fn build_term(
    table: &SheetTable,
    row: usize,
    section_map: &SectionMap,
    keys: &KeyColumns,
    builder: &mut DatasetBuilder,
) -> Option<DatasetTerm> {
    let name = table.term(row);
    if name.is_empty() {
        return None;
    }

    let cell = |col: Option<usize>| col.map(|c| table.cell(row, c).trim()).unwrap_or("");

    let definition = cell(keys.definition).to_string();
    let short_definition: String = definition.chars().take(SHORT_DEFINITION_CHARS).collect();

    let category_id = category_name(cell(keys.main_category))
        .filter(|n| !n.is_empty())
        .map(|n| builder.category_id(n));

    let mut subcategory_ids: Vec<String> = Vec::new();
    if let Some(category_id) = &category_id {
        for raw in subcategory_names(cell(keys.subcategory)) {
            let cleaned = clean_category_name(&raw);
            if cleaned.is_empty() {
                continue;
            }
            let id = builder.subcategory_id(category_id, cleaned);
            if !subcategory_ids.contains(&id) {
                subcategory_ids.push(id);
            }
        }
    }

    let mut sections = Map::new();
    for section in section_map.sections() {
        let mut content = Map::new();
        for (subsection, col) in &section.subsections {
            let text = table.cell(row, *col).trim();
            if !text.is_empty() {
                content.insert(subsection.clone(), Value::String(text.to_string()));
            }
        }
        if !content.is_empty() {
            sections.insert(section.name.clone(), Value::Object(content));
        }
    }

    let characteristics: Vec<String> = section_map
        .get("Introduction")
        .map(|intro| {
            intro
                .subsections
                .iter()
                .filter(|(sub, _)| sub.contains("Key Concepts"))
                .flat_map(|(_, col)| split_list(table.cell(row, *col).trim()))
                .collect()
        })
        .unwrap_or_default();

    let first_matching = |section: &str, needle: &str| -> Option<String> {
        section_map.get(section).and_then(|s| {
            s.subsections
                .iter()
                .filter(|(sub, _)| sub.contains(needle))
                .map(|(_, col)| table.cell(row, *col).trim())
                .find(|text| !text.is_empty())
                .map(str::to_string)
        })
    };

    Some(DatasetTerm {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        definition,
        short_definition,
        category_id,
        subcategory_ids,
        sections,
        characteristics,
        math_formulation: first_matching("Theoretical Concepts", "Math"),
        visual_url: first_matching("Illustration or Diagram", "Visual"),
    })
}

/// Cleaned main category for a category cell
fn category_name(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if is_tag_list(raw) {
        let parts: Vec<&str> = raw.split(',').map(str::trim).take(TAG_CATEGORY_PARTS).collect();
        parts.first().map(|primary| clean_category_name(primary))
    } else {
        Some(clean_category_name(&extract_category_from_text(raw)))
    }
}

/// Raw subcategory names for a subcategory cell
fn subcategory_names(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    if is_tag_list(raw) {
        return raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(TAG_SUBCATEGORY_PARTS)
            .map(str::to_string)
            .collect();
    }

    let extracted = extract_subcategories_from_text(raw);
    if extracted.is_empty() {
        split_list(raw)
    } else {
        extracted
    }
}

/// Split on `,`, else `;`, else keep the whole text
fn split_list(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let separator = if text.contains(',') {
        ','
    } else if text.contains(';') {
        ';'
    } else {
        return vec![text.to_string()];
    };
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load `input`, process it and write the dataset JSON to `output`
pub fn process_file(
    input: &Path,
    output: &Path,
    options: &ProcessOptions,
    on_chunk: impl FnMut(usize, usize),
) -> Result<(ProcessedDataset, ProcessingSummary)> {
    info!(input = %input.display(), "Processing glossary file");
    let table = SheetTable::load(input)?;
    info!(columns = table.column_count(), rows = table.row_count(), "Table loaded");

    let dataset = process_table(&table, &input.display().to_string(), options, on_chunk);
    super::write_json(output, &dataset)?;
    info!(output = %output.display(), "Dataset saved");

    let summary = ProcessingSummary {
        success: true,
        categories: dataset.categories.len(),
        subcategories: dataset.subcategories.len(),
        terms: dataset.terms.len(),
        chunks_processed: dataset
            .metadata
            .as_ref()
            .map(|m| m.chunks_processed)
            .unwrap_or(0),
        output_path: output.display().to_string(),
    };
    Ok((dataset, summary))
}
