//! Category endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::{DataResponse, PageQuery, Paginated};
use crate::db::categories::{self, CategorySummary, SubcategorySummary};
use crate::db::terms::{self, TermSummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<DataResponse<Vec<CategorySummary>>>> {
    let data = categories::list_categories(&state.db).await?;
    Ok(Json(DataResponse::new(data)))
}

async fn require_category(state: &AppState, id: &str) -> ApiResult<CategorySummary> {
    categories::get_category(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Category not found: {}", id)))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<CategorySummary>>> {
    let category = require_category(&state, &id).await?;
    Ok(Json(DataResponse::new(category)))
}

/// GET /api/categories/:id/terms
pub async fn category_terms(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<TermSummary>>> {
    require_category(&state, &id).await?;
    let (data, total) =
        terms::list_terms(&state.db, Some(&id), query.limit() as i64, query.offset()).await?;
    Ok(Json(Paginated::new(data, total, &query)))
}

/// GET /api/categories/:id/subcategories
pub async fn category_subcategories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<Vec<SubcategorySummary>>>> {
    require_category(&state, &id).await?;
    let data = categories::list_subcategories(&state.db, &id).await?;
    Ok(Json(DataResponse::new(data)))
}

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories))
        .route("/api/categories/:id", get(get_category))
        .route("/api/categories/:id/terms", get(category_terms))
        .route("/api/categories/:id/subcategories", get(category_subcategories))
}
