//! glossary-ingest library interface
//!
//! Data pipeline for the AI/ML glossary (spreadsheet processing,
//! change-detecting import, AI cell fill) and the HTTP API serving the
//! glossary and its admin operations.

pub mod api;
pub mod db;
pub mod error;
pub mod generation;
pub mod models;
pub mod operations;
pub mod parsing;
pub mod services;
pub mod table;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use generation::CompletionClient;
use glossary_common::config::TomlConfig;
use glossary_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Cancellation tokens for running operations
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background error, reported by the health check
    pub last_error: Arc<RwLock<Option<String>>>,
    pub config: Arc<TomlConfig>,
    pub root_folder: PathBuf,
    /// One permit per allowed concurrent generation run
    pub generation_slots: Arc<Semaphore>,
    /// `None` when no OpenAI API key is configured
    pub completion_client: Option<Arc<dyn CompletionClient>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: TomlConfig, root_folder: PathBuf) -> Self {
        let max_runs = config.generation.max_concurrent_runs.max(1);
        Self {
            db,
            event_bus,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
            root_folder,
            generation_slots: Arc::new(Semaphore::new(max_runs)),
            completion_client: None,
        }
    }

    pub fn with_completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completion_client = Some(client);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::health_routes())
        .merge(api::term_routes())
        .merge(api::category_routes())
        .merge(api::search_routes())
        .merge(api::admin_routes())
        .merge(api::event_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
