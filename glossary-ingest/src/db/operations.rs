//! Batch operation persistence

use crate::models::{BatchOperation, OperationError, OperationKind, OperationProgress, OperationState};
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use glossary_common::db::get_max_lock_wait_ms;
use glossary_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const OPERATION_COLUMNS: &str = "id, kind, state, source_path, parameters, \
     progress_current, progress_total, progress_percentage, current_operation, \
     errors, cost_usd, started_at, ended_at";

/// Insert or update an operation
///
/// A row already in a terminal state is never overwritten; returns `false`
/// when the write was refused for that reason. Uses `retry_on_lock` since
/// progress is saved while imports hold write transactions.
pub async fn save_operation(pool: &SqlitePool, operation: &BatchOperation) -> Result<bool> {
    let id = operation.id.to_string();
    let parameters = serde_json::to_string(&operation.parameters)
        .map_err(|e| Error::Internal(format!("Failed to serialize parameters: {}", e)))?;
    let errors = serde_json::to_string(&operation.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize errors: {}", e)))?;
    let started_at = operation.started_at.to_rfc3339();
    let ended_at = operation.ended_at.map(|dt| dt.to_rfc3339());
    let progress_current = operation.progress.current as i64;
    let progress_total = operation.progress.total as i64;

    let max_wait_ms = get_max_lock_wait_ms(pool).await?;

    retry_on_lock("save_operation", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO batch_operations (
                id, kind, state, source_path, parameters,
                progress_current, progress_total, progress_percentage,
                current_operation, errors, cost_usd, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                progress_current = excluded.progress_current,
                progress_total = excluded.progress_total,
                progress_percentage = excluded.progress_percentage,
                current_operation = excluded.current_operation,
                errors = excluded.errors,
                cost_usd = excluded.cost_usd,
                ended_at = excluded.ended_at
            WHERE batch_operations.state NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
            "#,
        )
        .bind(&id)
        .bind(operation.kind.as_str())
        .bind(operation.state.as_str())
        .bind(&operation.source_path)
        .bind(&parameters)
        .bind(progress_current)
        .bind(progress_total)
        .bind(operation.progress.percentage)
        .bind(&operation.progress.current_operation)
        .bind(&errors)
        .bind(operation.cost_usd)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    })
    .await
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

fn operation_from_row(row: &SqliteRow) -> Result<BatchOperation> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse operation id: {}", e)))?;

    let kind: String = row.get("kind");
    let kind: OperationKind = serde_json::from_value(serde_json::Value::String(kind))
        .map_err(|e| Error::Internal(format!("Failed to deserialize kind: {}", e)))?;

    let state: String = row.get("state");
    let state: OperationState = serde_json::from_value(serde_json::Value::String(state))
        .map_err(|e| Error::Internal(format!("Failed to deserialize state: {}", e)))?;

    let parameters: String = row.get("parameters");
    let parameters: serde_json::Value = serde_json::from_str(&parameters)
        .map_err(|e| Error::Internal(format!("Failed to deserialize parameters: {}", e)))?;

    let errors: String = row.get("errors");
    let errors: Vec<OperationError> = serde_json::from_str(&errors)
        .map_err(|e| Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = parse_timestamp(&started_at, "started_at")?;
    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| parse_timestamp(&s, "ended_at"))
        .transpose()?;

    let current = row.get::<i64, _>("progress_current") as usize;
    let total = row.get::<i64, _>("progress_total") as usize;
    let progress = OperationProgress {
        current,
        total,
        percentage: row.get("progress_percentage"),
        current_operation: row.get("current_operation"),
        elapsed_seconds: (ended_at.unwrap_or_else(Utc::now) - started_at)
            .num_seconds()
            .max(0) as u64,
        // Recalculated on the next progress update
        estimated_remaining_seconds: None,
    };

    Ok(BatchOperation {
        id,
        kind,
        state,
        source_path: row.get("source_path"),
        parameters,
        progress,
        errors,
        cost_usd: row.get("cost_usd"),
        started_at,
        ended_at,
    })
}

pub async fn load_operation(pool: &SqlitePool, id: Uuid) -> Result<Option<BatchOperation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM batch_operations WHERE id = ?",
        OPERATION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(operation_from_row).transpose()
}

/// Most recently started first
pub async fn list_operations(pool: &SqlitePool, limit: i64) -> Result<Vec<BatchOperation>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM batch_operations ORDER BY started_at DESC LIMIT ?",
        OPERATION_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(operation_from_row).collect()
}

pub async fn count_operations(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batch_operations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Operations left non-terminal by a previous process
///
/// Marks them FAILED at startup, since their tasks no longer exist.
pub async fn fail_interrupted_operations(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE batch_operations
        SET state = 'FAILED', ended_at = ?
        WHERE state IN ('PENDING', 'RUNNING')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
