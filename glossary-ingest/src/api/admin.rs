//! Admin endpoints: statistics and batch operations
//!
//! POST /api/admin/process, /import, /split and /generate validate the request,
//! persist a PENDING operation and spawn its executor. Progress is polled
//! through /api/admin/operations or streamed from /api/admin/events.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::DataResponse;
use crate::db::{categories, operations, terms};
use crate::error::{ApiError, ApiResult};
use crate::models::{BatchOperation, OperationKind, OperationState};
use crate::operations::{
    execute_generate, execute_import, execute_process, execute_split, GenerateRequest,
    ImportRequest, OperationTracker, ProcessRequest, SplitRequest,
};
use crate::table::TableFormat;
use crate::AppState;
use glossary_common::events::GlossaryEvent;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub terms: i64,
    pub categories: i64,
    pub subcategories: i64,
    pub operations: i64,
}

#[derive(Debug, Serialize)]
pub struct OperationAccepted {
    pub success: bool,
    pub operation_id: Uuid,
    pub state: OperationState,
    pub started_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OperationListQuery {
    pub limit: Option<u32>,
}

/// GET /api/admin/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<DataResponse<StatsResponse>>> {
    Ok(Json(DataResponse::new(StatsResponse {
        terms: terms::count_terms(&state.db).await?,
        categories: categories::count_categories(&state.db).await?,
        subcategories: categories::count_subcategories(&state.db).await?,
        operations: operations::count_operations(&state.db).await?,
    })))
}

/// Input must be an existing file in a supported format
fn validate_source(path: &str) -> ApiResult<TableFormat> {
    if path.trim().is_empty() {
        return Err(ApiError::BadRequest("Source path is required".to_string()));
    }
    let source = std::path::Path::new(path);
    if !source.exists() {
        return Err(ApiError::BadRequest(format!("Source file does not exist: {}", path)));
    }
    if !source.is_file() {
        return Err(ApiError::BadRequest(format!("Source path is not a file: {}", path)));
    }
    TableFormat::from_path(source).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Persist a new operation and register its cancellation token
async fn register_operation(
    state: &AppState,
    kind: OperationKind,
    source_path: &str,
    parameters: serde_json::Value,
) -> ApiResult<(Arc<OperationTracker>, CancellationToken, OperationAccepted)> {
    let operation = BatchOperation::new(kind, source_path.to_string(), parameters);
    operations::save_operation(&state.db, &operation).await?;

    let accepted = OperationAccepted {
        success: true,
        operation_id: operation.id,
        state: operation.state,
        started_at: operation.started_at,
    };

    let token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(operation.id, token.clone());

    tracing::info!(
        operation_id = %operation.id,
        kind = kind.as_str(),
        source_path,
        "Batch operation accepted"
    );

    let tracker = Arc::new(OperationTracker::new(
        state.db.clone(),
        state.event_bus.clone(),
        operation,
    ));
    Ok((tracker, token, accepted))
}

/// POST /api/admin/process
pub async fn start_process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<OperationAccepted>)> {
    validate_source(&request.input)?;
    if request.output.trim().is_empty() {
        return Err(ApiError::BadRequest("Output path is required".to_string()));
    }

    let parameters = serde_json::json!({
        "output": request.output,
        "chunk_size": request.chunk_size,
        "max_chunks": request.max_chunks,
        "import_into_database": request.import_into_database,
    });
    let (tracker, token, accepted) =
        register_operation(&state, OperationKind::Process, &request.input, parameters).await?;

    tokio::spawn(execute_process(state.clone(), tracker, request, token));
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/admin/import
pub async fn start_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<OperationAccepted>)> {
    validate_source(&request.path)?;

    let parameters = serde_json::json!({
        "force_all": request.force_all,
        "dry_run": request.dry_run,
        "chunk_size": request.chunk_size,
    });
    let (tracker, token, accepted) =
        register_operation(&state, OperationKind::Import, &request.path, parameters).await?;

    tokio::spawn(execute_import(state.clone(), tracker, request, token));
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/admin/split
pub async fn start_split(
    State(state): State<AppState>,
    Json(request): Json<SplitRequest>,
) -> ApiResult<(StatusCode, Json<OperationAccepted>)> {
    if validate_source(&request.input)? != TableFormat::Json {
        return Err(ApiError::BadRequest(
            "Split expects a dataset JSON file".to_string(),
        ));
    }
    if request.output_dir.trim().is_empty() {
        return Err(ApiError::BadRequest("Output directory is required".to_string()));
    }

    let parameters = serde_json::json!({
        "output_dir": request.output_dir,
        "chunk_size": request.chunk_size,
    });
    let (tracker, token, accepted) =
        register_operation(&state, OperationKind::Split, &request.input, parameters).await?;

    tokio::spawn(execute_split(state.clone(), tracker, request, token));
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/admin/generate
///
/// 409 when `max_concurrent_runs` generation runs are already active.
pub async fn start_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<OperationAccepted>)> {
    if validate_source(&request.path)? == TableFormat::Excel {
        return Err(ApiError::BadRequest(
            "Excel files cannot be written back; convert to CSV first".to_string(),
        ));
    }
    let order = request
        .fill_order()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if state.completion_client.is_none() {
        return Err(ApiError::BadRequest(
            "No OpenAI API key configured".to_string(),
        ));
    }

    let permit = state
        .generation_slots
        .clone()
        .try_acquire_owned()
        .map_err(|_| {
            ApiError::Conflict(format!(
                "Maximum of {} concurrent generation runs already active",
                state.config.generation.max_concurrent_runs
            ))
        })?;

    let parameters = serde_json::json!({
        "mode": order,
        "workers": request.workers,
        "batch_size": request.batch_size,
        "checkpoint_path": request.checkpoint().display().to_string(),
    });
    let (tracker, token, accepted) =
        register_operation(&state, OperationKind::Generate, &request.path, parameters).await?;

    tokio::spawn(execute_generate(state.clone(), tracker, request, token, permit));
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

fn parse_operation_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound(format!("Operation not found: {}", id)))
}

/// GET /api/admin/operations
pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<OperationListQuery>,
) -> ApiResult<Json<DataResponse<Vec<BatchOperation>>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500) as i64;
    let data = operations::list_operations(&state.db, limit).await?;
    Ok(Json(DataResponse::new(data)))
}

/// GET /api/admin/operations/:id
pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<BatchOperation>>> {
    let operation_id = parse_operation_id(&id)?;
    let operation = operations::load_operation(&state.db, operation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Operation not found: {}", id)))?;
    Ok(Json(DataResponse::new(operation)))
}

/// POST /api/admin/operations/:id/cancel
///
/// Signals the running task and records the operation as CANCELLED.
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<BatchOperation>>> {
    let operation_id = parse_operation_id(&id)?;
    let mut operation = operations::load_operation(&state.db, operation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Operation not found: {}", id)))?;

    if operation.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Operation already in terminal state: {}",
            operation.state.as_str()
        )));
    }

    if let Some(token) = state.cancellation_tokens.read().await.get(&operation_id) {
        token.cancel();
    }

    // The executor may finish between the load and this write; a terminal
    // row is never overwritten, so report whatever state won.
    operation.transition_to(OperationState::Cancelled);
    operation.progress.current_operation = "Cancelled".to_string();
    if !operations::save_operation(&state.db, &operation).await? {
        let current = operations::load_operation(&state.db, operation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Operation not found: {}", id)))?;
        return Err(ApiError::BadRequest(format!(
            "Operation already in terminal state: {}",
            current.state.as_str()
        )));
    }

    state.event_bus.emit_lossy(GlossaryEvent::OperationCancelled {
        operation_id,
        timestamp: Utc::now(),
    });
    tracing::info!(operation_id = %operation_id, "Operation cancelled");

    Ok(Json(DataResponse::new(operation)))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/process", post(start_process))
        .route("/api/admin/import", post(start_import))
        .route("/api/admin/split", post(start_split))
        .route("/api/admin/generate", post(start_generate))
        .route("/api/admin/operations", get(list_operations))
        .route("/api/admin/operations/:id", get(get_operation))
        .route("/api/admin/operations/:id/cancel", post(cancel_operation))
}
