//! Change-detecting import of spreadsheet rows into the `terms` table
//!
//! Every row is fingerprinted (SHA-256 of its cells joined with `|`) and
//! compared with the fingerprint recorded by the previous run, so only new
//! or edited terms are emitted. Changes become a reviewable SQL script that
//! can be executed later, or are applied directly in one transaction.

use crate::table::SheetTable;
use chrono::{DateTime, Utc};
use glossary_common::db::{GENERATED_CATEGORY_DESCRIPTION, GENERATED_CATEGORY_NAME};
use glossary_common::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const HASH_FILE: &str = "import_hashes.json";
pub const SUMMARY_FILE: &str = "import_summary.json";

/// Content keys that map onto dedicated term columns
const CORE_FIELDS: [&str; 5] = [
    "definition",
    "short_definition",
    "summary",
    "overview",
    "description",
];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Ignore stored hashes and emit every term
    pub force_all: bool,
    /// Build the plan without writing the script, hash store or summary
    pub dry_run: bool,
    /// Rows per progress step
    pub chunk_size: usize,
    /// Directory receiving the SQL script, hash store and summary
    pub work_dir: PathBuf,
}

impl ImportOptions {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            force_all: false,
            dry_run: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            work_dir: work_dir.into(),
        }
    }

    pub fn hash_file(&self) -> PathBuf {
        self.work_dir.join(HASH_FILE)
    }

    pub fn summary_file(&self) -> PathBuf {
        self.work_dir.join(SUMMARY_FILE)
    }
}

/// One new or edited term
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermChange {
    pub name: String,
    pub definition: String,
    pub short_definition: String,
    /// Remaining content as a JSON object, `None` when there is none
    pub applications: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPlan {
    pub input_file: String,
    pub changes: Vec<TermChange>,
    /// Hash store to persist after this run
    pub hashes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ImportPlan {
    pub fn total_terms(&self) -> usize {
        self.hashes.len()
    }

    pub fn changed_terms(&self) -> usize {
        self.changes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub success: bool,
    pub input_file: String,
    pub sql_file: Option<String>,
    pub total_terms: usize,
    pub processed_terms: usize,
    pub changed_terms: usize,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

/// SHA-256 hex of all cells joined with `|`
pub fn row_hash(cells: &[&str]) -> String {
    let digest = Sha256::digest(cells.join("|").as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct IncrementalImporter {
    options: ImportOptions,
}

impl IncrementalImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Load the hash store; a missing or unreadable store means "no history"
    pub fn load_hashes(&self) -> BTreeMap<String, String> {
        let path = self.options.hash_file();
        if !path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable hash store");
                BTreeMap::new()
            }
        }
    }

    /// Compare `table` against the stored hashes
    ///
    /// `on_chunk(done, total)` is called after each chunk of rows.
    pub fn plan(
        &self,
        table: &SheetTable,
        input_file: &str,
        mut on_chunk: impl FnMut(usize, usize),
    ) -> ImportPlan {
        let existing = if self.options.force_all {
            BTreeMap::new()
        } else {
            self.load_hashes()
        };

        let chunk_size = self.options.chunk_size.max(1);
        let total_chunks = table.row_count().div_ceil(chunk_size);
        let mut hashes = BTreeMap::new();
        let mut changes = Vec::new();

        for chunk in 0..total_chunks {
            let start = chunk * chunk_size;
            let end = (start + chunk_size).min(table.row_count());
            for row in start..end {
                let term = table.term(row);
                if term.is_empty() {
                    continue;
                }

                let cells: Vec<&str> = (0..table.column_count()).map(|c| table.cell(row, c)).collect();
                let hash = row_hash(&cells);
                let unchanged = existing.get(term) == Some(&hash);
                hashes.insert(term.to_string(), hash);
                if unchanged {
                    continue;
                }

                changes.push(term_change(table, row, term));
                if changes.len() % 100 == 0 {
                    info!(terms = changes.len(), "Generated changes");
                }
            }
            info!(chunk = chunk + 1, total_chunks, "Processed import chunk");
            on_chunk(chunk + 1, total_chunks);
        }

        ImportPlan {
            input_file: input_file.to_string(),
            changes,
            hashes,
            created_at: Utc::now(),
        }
    }

    /// Write the SQL script, hash store and summary (skipped on dry runs)
    pub fn write_outputs(&self, plan: &ImportPlan) -> Result<ImportSummary> {
        let mut summary = ImportSummary {
            success: true,
            input_file: plan.input_file.clone(),
            sql_file: None,
            total_terms: plan.total_terms(),
            processed_terms: plan.changed_terms(),
            changed_terms: plan.changed_terms(),
            dry_run: self.options.dry_run,
            timestamp: Utc::now(),
        };

        if self.options.dry_run {
            info!(changed = summary.changed_terms, "Dry run: nothing written");
            return Ok(summary);
        }

        std::fs::create_dir_all(&self.options.work_dir)?;
        let sql_path = self.options.work_dir.join(format!(
            "aiml_import_{}.sql",
            plan.created_at.format("%Y-%m-%d_%H-%M-%S")
        ));
        std::fs::write(&sql_path, render_sql(plan))?;
        super::write_json(&self.options.hash_file(), &plan.hashes)?;

        summary.sql_file = Some(sql_path.display().to_string());
        super::write_json(&self.options.summary_file(), &summary)?;

        info!(
            total = summary.total_terms,
            changed = summary.changed_terms,
            sql_file = %sql_path.display(),
            "Import preparation complete"
        );
        Ok(summary)
    }

    /// Load `input`, plan and write outputs
    pub fn run(
        &self,
        input: &Path,
        on_chunk: impl FnMut(usize, usize),
    ) -> Result<(ImportPlan, ImportSummary)> {
        let table = SheetTable::load(input)?;
        info!(input = %input.display(), rows = table.row_count(), "Starting incremental import");
        let plan = self.plan(&table, &input.display().to_string(), on_chunk);
        let summary = self.write_outputs(&plan)?;
        Ok((plan, summary))
    }
}

fn term_change(table: &SheetTable, row: usize, term: &str) -> TermChange {
    let mut content: Map<String, Value> = Map::new();
    for (col, header) in table.headers.iter().enumerate().skip(1) {
        let text = table.cell(row, col).trim();
        if !text.is_empty() {
            content.insert(header.trim().to_lowercase(), Value::String(text.to_string()));
        }
    }

    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| content.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };
    let definition = field(&["definition", "overview", "description"]).unwrap_or_else(|| term.to_string());
    let short_definition = field(&["short_definition", "summary"]).unwrap_or_default();

    let applications: Map<String, Value> = content
        .iter()
        .filter(|(k, _)| !CORE_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    TermChange {
        name: term.to_string(),
        definition,
        short_definition,
        applications: (!applications.is_empty()).then(|| Value::Object(applications).to_string()),
    }
}

/// SQL script applying `plan` inside one transaction
pub fn render_sql(plan: &ImportPlan) -> String {
    let mut lines = vec![
        "-- AI/ML Glossary Database Import".to_string(),
        format!("-- Generated: {}", plan.created_at.to_rfc3339()),
        format!("-- Source: {}", plan.input_file),
        String::new(),
        "BEGIN;".to_string(),
        String::new(),
        format!("-- Ensure {} category exists", GENERATED_CATEGORY_NAME),
        "INSERT INTO categories (id, name, description) VALUES".to_string(),
        format!(
            "({}, {}, {})",
            sql_quote(&Uuid::new_v4().to_string()),
            sql_quote(GENERATED_CATEGORY_NAME),
            sql_quote(GENERATED_CATEGORY_DESCRIPTION)
        ),
        "ON CONFLICT (name) DO NOTHING;".to_string(),
        String::new(),
    ];

    for change in &plan.changes {
        let applications = change
            .applications
            .as_deref()
            .map(sql_quote)
            .unwrap_or_else(|| "NULL".to_string());
        lines.push(format!(
            "INSERT INTO terms (id, name, definition, short_definition, applications, category_id) VALUES \
             ({}, {}, {}, {}, {}, (SELECT id FROM categories WHERE name = {} LIMIT 1)) \
             ON CONFLICT (name) DO UPDATE SET \
             definition = excluded.definition, \
             short_definition = excluded.short_definition, \
             applications = excluded.applications, \
             updated_at = CURRENT_TIMESTAMP;",
            sql_quote(&Uuid::new_v4().to_string()),
            sql_quote(&change.name),
            sql_quote(&change.definition),
            sql_quote(&change.short_definition),
            applications,
            sql_quote(GENERATED_CATEGORY_NAME),
        ));
        lines.push(String::new());
    }

    lines.push("COMMIT;".to_string());
    lines.push(String::new());
    lines.push(format!(
        "-- Import complete: {} terms processed ({} new/changed)",
        plan.changed_terms(),
        plan.changed_terms()
    ));
    lines.join("\n")
}

/// Execute a previously generated SQL script as a single unit
///
/// Scripts without their own `BEGIN;` are wrapped in a transaction. On
/// failure the transaction is rolled back.
pub async fn execute_sql_file(pool: &SqlitePool, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(format!("SQL file not found: {}", path.display())));
    }
    let script = std::fs::read_to_string(path)?;
    let has_transaction = script.lines().any(|l| l.trim().eq_ignore_ascii_case("BEGIN;"));
    let script = if has_transaction {
        script
    } else {
        format!("BEGIN;\n{}\nCOMMIT;\n", script)
    };

    info!(path = %path.display(), "Executing SQL file");
    let mut conn = pool.acquire().await?;
    match sqlx::raw_sql(&script).execute(&mut *conn).await {
        Ok(_) => {
            info!(path = %path.display(), "SQL executed successfully");
            Ok(())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "SQL execution failed, rolling back");
            if let Err(rollback_err) = sqlx::raw_sql("ROLLBACK").execute(&mut *conn).await {
                // Nothing to roll back when the failure happened before BEGIN
                tracing::debug!(error = %rollback_err, "Rollback skipped");
            }
            Err(Error::Database(e))
        }
    }
}

/// Apply `plan` directly with bound parameters in one transaction
///
/// Returns the number of terms written.
pub async fn apply_changes(pool: &SqlitePool, plan: &ImportPlan) -> Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO categories (id, name, description) VALUES (?, ?, ?) \
         ON CONFLICT (name) DO NOTHING",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(GENERATED_CATEGORY_NAME)
    .bind(GENERATED_CATEGORY_DESCRIPTION)
    .execute(&mut *tx)
    .await?;

    let category_id: String = sqlx::query_scalar("SELECT id FROM categories WHERE name = ?")
        .bind(GENERATED_CATEGORY_NAME)
        .fetch_one(&mut *tx)
        .await?;

    for change in &plan.changes {
        sqlx::query(
            r#"
            INSERT INTO terms (id, name, definition, short_definition, applications, category_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                definition = excluded.definition,
                short_definition = excluded.short_definition,
                applications = excluded.applications,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&change.name)
        .bind(&change.definition)
        .bind(&change.short_definition)
        .bind(&change.applications)
        .bind(&category_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(terms = plan.changes.len(), "Applied import changes");
    Ok(plan.changes.len())
}
