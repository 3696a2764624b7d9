//! Category and subcategory queries

use glossary_common::Result;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub term_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SubcategorySummary {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub term_count: i64,
}

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.description, \
     (SELECT COUNT(*) FROM terms t WHERE t.category_id = c.id) AS term_count \
     FROM categories c";

/// All categories ordered by name
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<CategorySummary>> {
    let categories: Vec<CategorySummary> = sqlx::query_as(&format!(
        "{} ORDER BY c.name COLLATE NOCASE",
        CATEGORY_SELECT
    ))
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

pub async fn get_category(pool: &SqlitePool, id: &str) -> Result<Option<CategorySummary>> {
    let category: Option<CategorySummary> =
        sqlx::query_as(&format!("{} WHERE c.id = ?", CATEGORY_SELECT))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(category)
}

pub async fn list_subcategories(
    pool: &SqlitePool,
    category_id: &str,
) -> Result<Vec<SubcategorySummary>> {
    let subcategories: Vec<SubcategorySummary> = sqlx::query_as(
        r#"
        SELECT s.id, s.name, s.category_id,
               (SELECT COUNT(*) FROM term_subcategories ts WHERE ts.subcategory_id = s.id) AS term_count
        FROM subcategories s
        WHERE s.category_id = ?
        ORDER BY s.name COLLATE NOCASE
        "#,
    )
    .bind(category_id)
    .fetch_all(pool)
    .await?;
    Ok(subcategories)
}

pub async fn count_categories(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_subcategories(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subcategories")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
