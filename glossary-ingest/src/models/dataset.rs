//! Structured glossary dataset produced from a spreadsheet
//!
//! Serialized camelCase (`categoryId`, `subcategoryIds`, `shortDefinition`)
//! since the JSON files are consumed by the web front end as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSubcategory {
    pub id: String,
    pub name: String,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetTerm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub short_definition: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub subcategory_ids: Vec<String>,
    /// Section → subsection → cell text
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub sections: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characteristics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math_formulation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub source_file: String,
    pub processed_at: DateTime<Utc>,
    pub total_rows: usize,
    pub chunk_size: usize,
    pub chunks_processed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDataset {
    #[serde(default)]
    pub categories: Vec<DatasetCategory>,
    #[serde(default)]
    pub subcategories: Vec<DatasetSubcategory>,
    #[serde(default)]
    pub terms: Vec<DatasetTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DatasetMetadata>,
}

impl ProcessedDataset {
    pub fn load(path: &std::path::Path) -> glossary_common::Result<Self> {
        if !path.exists() {
            return Err(glossary_common::Error::NotFound(format!(
                "Dataset not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            glossary_common::Error::InvalidInput(format!(
                "Invalid dataset {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_uses_camel_case_keys() {
        let term = DatasetTerm {
            id: "t1".into(),
            name: "Transformer".into(),
            definition: "Attention based architecture".into(),
            short_definition: "Attention based".into(),
            category_id: Some("c1".into()),
            subcategory_ids: vec!["s1".into()],
            sections: Map::new(),
            characteristics: Vec::new(),
            math_formulation: None,
            visual_url: None,
        };
        let json = serde_json::to_value(&term).unwrap();

        assert_eq!(json["categoryId"], "c1");
        assert_eq!(json["subcategoryIds"][0], "s1");
        assert_eq!(json["shortDefinition"], "Attention based");
        assert!(json.get("sections").is_none());
        assert!(json.get("mathFormulation").is_none());
    }

    #[test]
    fn test_partial_dataset_deserializes() {
        let dataset: ProcessedDataset =
            serde_json::from_str(r#"{"terms": [{"id": "t1", "name": "GAN"}]}"#).unwrap();
        assert!(dataset.categories.is_empty());
        assert_eq!(dataset.terms[0].category_id, None);
        assert!(dataset.metadata.is_none());
    }
}
