//! Row models for the glossary tables

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Name of the category that incremental imports attach terms to
pub const GENERATED_CATEGORY_NAME: &str = "AI/ML Generated";

/// Description stored with the generated category
pub const GENERATED_CATEGORY_DESCRIPTION: &str = "Terms imported from AI/ML processing system";

/// `categories` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// `subcategories` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubcategoryRow {
    pub id: String,
    pub name: String,
    pub category_id: String,
}

/// `terms` row
///
/// JSON-valued columns (`applications`, `sections`, `characteristics`) are kept
/// as raw text here; callers decode them when building responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TermRow {
    pub id: String,
    pub name: String,
    pub definition: String,
    pub short_definition: String,
    pub category_id: Option<String>,
    pub applications: Option<String>,
    pub sections: Option<String>,
    pub characteristics: Option<String>,
    pub math_formulation: Option<String>,
    pub visual_url: Option<String>,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Column list matching `TermRow`, for `SELECT` statements
pub const TERM_COLUMNS: &str = "id, name, definition, short_definition, category_id, \
     applications, sections, characteristics, math_formulation, visual_url, \
     view_count, CAST(created_at AS TEXT) AS created_at, CAST(updated_at AS TEXT) AS updated_at";

/// Column list matching `CategoryRow`
pub const CATEGORY_COLUMNS: &str =
    "id, name, description, CAST(created_at AS TEXT) AS created_at";
