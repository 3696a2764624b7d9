//! Load a processed dataset into the glossary database
//!
//! Everything happens in one transaction. Rows are matched by natural key
//! (category name, `(category, subcategory name)`, term name), so
//! re-importing a freshly processed file updates rows in place even though
//! the dataset carries newly generated ids.

use crate::models::ProcessedDataset;
use glossary_common::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetImportSummary {
    pub categories: usize,
    pub subcategories: usize,
    pub terms: usize,
    pub subcategory_links: usize,
}

pub async fn import_dataset(pool: &SqlitePool, dataset: &ProcessedDataset) -> Result<DatasetImportSummary> {
    let mut tx = pool.begin().await?;
    let mut summary = DatasetImportSummary::default();

    // dataset id → persisted id
    let mut category_ids: HashMap<&str, String> = HashMap::new();
    for category in &dataset.categories {
        let id: String = sqlx::query_scalar(
            "INSERT INTO categories (id, name) VALUES (?, ?) \
             ON CONFLICT (name) DO UPDATE SET name = excluded.name \
             RETURNING id",
        )
        .bind(&category.id)
        .bind(&category.name)
        .fetch_one(&mut *tx)
        .await?;
        category_ids.insert(category.id.as_str(), id);
        summary.categories += 1;
    }

    let mut subcategory_ids: HashMap<&str, String> = HashMap::new();
    for subcategory in &dataset.subcategories {
        let Some(category_id) = category_ids.get(subcategory.category_id.as_str()) else {
            warn!(
                subcategory = %subcategory.name,
                category_id = %subcategory.category_id,
                "Skipping subcategory with unknown category"
            );
            continue;
        };
        let id: String = sqlx::query_scalar(
            "INSERT INTO subcategories (id, name, category_id) VALUES (?, ?, ?) \
             ON CONFLICT (category_id, name) DO UPDATE SET name = excluded.name \
             RETURNING id",
        )
        .bind(&subcategory.id)
        .bind(&subcategory.name)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;
        subcategory_ids.insert(subcategory.id.as_str(), id);
        summary.subcategories += 1;
    }

    for term in &dataset.terms {
        let category_id = term
            .category_id
            .as_deref()
            .and_then(|id| category_ids.get(id))
            .cloned();
        let sections = (!term.sections.is_empty())
            .then(|| Value::Object(term.sections.clone()).to_string());
        let characteristics = (!term.characteristics.is_empty())
            .then(|| serde_json::to_string(&term.characteristics))
            .transpose()?;

        let term_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO terms (
                id, name, definition, short_definition, category_id,
                sections, characteristics, math_formulation, visual_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                definition = excluded.definition,
                short_definition = excluded.short_definition,
                category_id = excluded.category_id,
                sections = excluded.sections,
                characteristics = excluded.characteristics,
                math_formulation = excluded.math_formulation,
                visual_url = excluded.visual_url,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(&term.id)
        .bind(&term.name)
        .bind(&term.definition)
        .bind(&term.short_definition)
        .bind(&category_id)
        .bind(&sections)
        .bind(&characteristics)
        .bind(&term.math_formulation)
        .bind(&term.visual_url)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM term_subcategories WHERE term_id = ?")
            .bind(&term_id)
            .execute(&mut *tx)
            .await?;
        for subcategory_id in term
            .subcategory_ids
            .iter()
            .filter_map(|id| subcategory_ids.get(id.as_str()))
        {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO term_subcategories (term_id, subcategory_id) VALUES (?, ?)",
            )
            .bind(&term_id)
            .bind(subcategory_id)
            .execute(&mut *tx)
            .await?;
            summary.subcategory_links += result.rows_affected() as usize;
        }

        summary.terms += 1;
        if summary.terms % 500 == 0 {
            debug!(terms = summary.terms, "Importing terms");
        }
    }

    tx.commit().await?;
    info!(
        categories = summary.categories,
        subcategories = summary.subcategories,
        terms = summary.terms,
        links = summary.subcategory_links,
        "Dataset imported"
    );
    Ok(summary)
}
