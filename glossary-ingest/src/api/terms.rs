//! Term endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::{DataResponse, PageQuery, Paginated};
use crate::db::terms::{self, TermDetail, TermSummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/terms?page=&limit=&category=
pub async fn list_terms(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<TermSummary>>> {
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());
    let (data, total) =
        terms::list_terms(&state.db, category, query.limit() as i64, query.offset()).await?;
    Ok(Json(Paginated::new(data, total, &query)))
}

/// GET /api/terms/:id
///
/// Counts as a view.
pub async fn get_term(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<TermDetail>>> {
    if !terms::increment_view_count(&state.db, &id).await? {
        return Err(ApiError::NotFound(format!("Term not found: {}", id)));
    }

    let term = terms::get_term(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Term not found: {}", id)))?;

    tracing::debug!(term_id = %id, views = term.view_count, "Term viewed");
    Ok(Json(DataResponse::new(term)))
}

pub fn term_routes() -> Router<AppState> {
    Router::new()
        .route("/api/terms", get(list_terms))
        .route("/api/terms/:id", get(get_term))
}
