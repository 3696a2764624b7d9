//! Term queries

use glossary_common::db::{TermRow, TERM_COLUMNS};
use glossary_common::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

/// Term as listed in pages and search results
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TermSummary {
    pub id: String,
    pub name: String,
    pub short_definition: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub view_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// Full term with decoded JSON columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermDetail {
    pub id: String,
    pub name: String,
    pub definition: String,
    pub short_definition: String,
    pub category: Option<NamedRef>,
    pub subcategories: Vec<NamedRef>,
    pub applications: Option<Value>,
    pub sections: Option<Value>,
    pub characteristics: Option<Value>,
    pub math_formulation: Option<String>,
    pub visual_url: Option<String>,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

const SUMMARY_SELECT: &str = "SELECT t.id, t.name, t.short_definition, t.category_id, \
     c.name AS category_name, t.view_count \
     FROM terms t LEFT JOIN categories c ON c.id = t.category_id";

/// JSON text columns hold either JSON or legacy plain text
fn decode_json_column(raw: Option<String>) -> Option<Value> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
}

/// One page of terms ordered by name, plus the total matching count
pub async fn list_terms(
    pool: &SqlitePool,
    category_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<TermSummary>, i64)> {
    let terms: Vec<TermSummary> = sqlx::query_as(&format!(
        "{} WHERE (? IS NULL OR t.category_id = ?) \
         ORDER BY t.name COLLATE NOCASE LIMIT ? OFFSET ?",
        SUMMARY_SELECT
    ))
    .bind(category_id)
    .bind(category_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM terms WHERE (? IS NULL OR category_id = ?)")
            .bind(category_id)
            .bind(category_id)
            .fetch_one(pool)
            .await?;

    Ok((terms, total))
}

pub async fn get_term(pool: &SqlitePool, id: &str) -> Result<Option<TermDetail>> {
    let row: Option<TermRow> =
        sqlx::query_as(&format!("SELECT {} FROM terms WHERE id = ?", TERM_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let category: Option<NamedRef> = match &row.category_id {
        Some(category_id) => {
            sqlx::query_as("SELECT id, name FROM categories WHERE id = ?")
                .bind(category_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let subcategories: Vec<NamedRef> = sqlx::query_as(
        r#"
        SELECT s.id, s.name
        FROM term_subcategories ts
        JOIN subcategories s ON s.id = ts.subcategory_id
        WHERE ts.term_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(TermDetail {
        id: row.id,
        name: row.name,
        definition: row.definition,
        short_definition: row.short_definition,
        category,
        subcategories,
        applications: decode_json_column(row.applications),
        sections: decode_json_column(row.sections),
        characteristics: decode_json_column(row.characteristics),
        math_formulation: row.math_formulation,
        visual_url: row.visual_url,
        view_count: row.view_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

/// Returns false when the term does not exist
pub async fn increment_view_count(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE terms SET view_count = view_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Case-insensitive search on name and definition
///
/// Ranked exact name, name prefix, name contains, definition only; ties by
/// name.
pub async fn search_terms(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<TermSummary>> {
    let needle = query.trim().to_lowercase();
    let escaped = escape_like(&needle);
    let prefix = format!("{}%", escaped);
    let contains = format!("%{}%", escaped);

    let terms: Vec<TermSummary> = sqlx::query_as(&format!(
        r#"
        {}
        WHERE lower(t.name) LIKE ? ESCAPE '\'
           OR lower(t.definition) LIKE ? ESCAPE '\'
        ORDER BY
            CASE
                WHEN lower(t.name) = ? THEN 0
                WHEN lower(t.name) LIKE ? ESCAPE '\' THEN 1
                WHEN lower(t.name) LIKE ? ESCAPE '\' THEN 2
                ELSE 3
            END,
            t.name COLLATE NOCASE
        LIMIT ?
        "#,
        SUMMARY_SELECT
    ))
    .bind(&contains)
    .bind(&contains)
    .bind(&needle)
    .bind(&prefix)
    .bind(&contains)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(terms)
}

pub async fn count_terms(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terms")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossary_common::db::init_in_memory;

    async fn seed(pool: &SqlitePool) {
        sqlx::query("INSERT INTO categories (id, name) VALUES ('c1', 'Deep Learning'), ('c2', 'Statistics')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO subcategories (id, name, category_id) VALUES ('s1', 'Regularization', 'c1')")
            .execute(pool)
            .await
            .unwrap();
        for (id, name, definition, category) in [
            ("t1", "Dropout", "Randomly disables neurons", "c1"),
            ("t2", "Dropout Rate", "Fraction of units dropped", "c1"),
            ("t3", "Monte Carlo Dropout", "Dropout at inference time", "c1"),
            ("t4", "Bayesian Inference", "Uses dropout as approximate inference", "c2"),
            ("t5", "Variance", "Spread of a distribution", "c2"),
        ] {
            sqlx::query(
                "INSERT INTO terms (id, name, definition, short_definition, category_id, sections) \
                 VALUES (?, ?, ?, ?, ?, '{\"Overview\":{\"Summary\":\"x\"}}')",
            )
            .bind(id)
            .bind(name)
            .bind(definition)
            .bind(definition)
            .bind(category)
            .execute(pool)
            .await
            .unwrap();
        }
        sqlx::query("INSERT INTO term_subcategories (term_id, subcategory_id) VALUES ('t1', 's1')")
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_ranking() {
        let pool = init_in_memory().await.unwrap();
        seed(&pool).await;

        let results = search_terms(&pool, "DROPOUT", 10).await.unwrap();
        let names: Vec<&str> = results.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Dropout", "Dropout Rate", "Monte Carlo Dropout", "Bayesian Inference"]
        );
        assert_eq!(results[0].category_name.as_deref(), Some("Deep Learning"));

        assert_eq!(search_terms(&pool, "dropout", 2).await.unwrap().len(), 2);
        assert!(search_terms(&pool, "100%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_terms_with_category_filter() {
        let pool = init_in_memory().await.unwrap();
        seed(&pool).await;

        let (page, total) = list_terms(&pool, None, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "Bayesian Inference");

        let (page, total) = list_terms(&pool, Some("c2"), 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert!(page.iter().all(|t| t.category_id.as_deref() == Some("c2")));
    }

    #[tokio::test]
    async fn test_get_term_and_view_count() {
        let pool = init_in_memory().await.unwrap();
        seed(&pool).await;

        assert!(increment_view_count(&pool, "t1").await.unwrap());
        assert!(!increment_view_count(&pool, "missing").await.unwrap());

        let term = get_term(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(term.view_count, 1);
        assert_eq!(term.category.unwrap().name, "Deep Learning");
        assert_eq!(term.subcategories[0].name, "Regularization");
        assert_eq!(term.sections.unwrap()["Overview"]["Summary"], "x");

        assert!(get_term(&pool, "missing").await.unwrap().is_none());
        assert_eq!(count_terms(&pool).await.unwrap(), 5);
    }
}
