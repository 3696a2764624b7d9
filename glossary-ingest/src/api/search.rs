//! Term search endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::clamp_limit;
use crate::db::terms::{self, TermSummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub data: Vec<TermSummary>,
    pub total: usize,
}

/// GET /api/search?q=&limit=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Search query 'q' is required".to_string()));
    }

    let data = terms::search_terms(&state.db, query, clamp_limit(params.limit) as i64).await?;
    tracing::debug!(query, results = data.len(), "Search");

    Ok(Json(SearchResponse {
        success: true,
        query: query.to_string(),
        total: data.len(),
        data,
    }))
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/api/search", get(search))
}
