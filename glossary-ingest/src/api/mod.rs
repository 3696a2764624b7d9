//! HTTP API handlers
//!
//! Public glossary reads (terms, categories, search), admin batch
//! operations and the SSE event stream.

pub mod admin;
pub mod categories;
pub mod health;
pub mod search;
pub mod sse;
pub mod terms;

pub use admin::admin_routes;
pub use categories::category_routes;
pub use health::health_routes;
pub use search::search_routes;
pub use sse::{event_routes, event_stream};
pub use terms::term_routes;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&limit=` query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
}

impl PageQuery {
    /// 1-based
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.limit() as i64
    }
}

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, query: &PageQuery) -> Self {
        let has_more = query.offset() + (data.len() as i64) < total;
        Self {
            success: true,
            data,
            total,
            page: query.page(),
            limit: query.limit(),
            has_more,
        }
    }
}

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
