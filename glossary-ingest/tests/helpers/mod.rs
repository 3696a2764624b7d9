//! Shared fixtures for glossary-ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use glossary_common::config::TomlConfig;
use glossary_common::db::init_in_memory;
use glossary_common::events::EventBus;
use glossary_ingest::db::operations::load_operation;
use glossary_ingest::generation::{Completion, CompletionClient, GenerationError};
use glossary_ingest::models::BatchOperation;
use glossary_ingest::AppState;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const GLOSSARY_HEADERS: &str = "Term,\
Introduction – Definition and Overview,\
Introduction – Category and Sub-category of the Term – Main Category,\
Introduction – Category and Sub-category of the Term – Sub-category,\
Applications – Use Cases";

/// Sheet with one blank content cell per term in the last column
///
/// Main category cells are tag lists, so the primary tag names the category.
pub fn write_glossary_csv(dir: &Path) -> PathBuf {
    let path = dir.join("glossary.csv");
    let content = format!(
        "{}\n\
         Dropout,Randomly zeroes activations during training.,\"Deep Learning, Neural Networks, Regularization\",Regularization,\n\
         Gradient Descent,Iterative first-order optimization.,\"Optimization, Calculus, Numerical Methods\",First-order methods,\n",
        GLOSSARY_HEADERS
    );
    std::fs::write(&path, content).unwrap();
    path
}

/// State over an in-memory database, rooted in `root`
pub async fn test_state(root: &Path, config: TomlConfig) -> AppState {
    let pool = init_in_memory().await.unwrap();
    AppState::new(pool, EventBus::new(100), config, root.to_path_buf())
}

pub async fn seed_glossary(pool: &SqlitePool) {
    sqlx::query(
        "INSERT INTO categories (id, name, description) VALUES \
         ('c-dl', 'Deep Learning', 'Neural network methods'), \
         ('c-stats', 'Statistics', NULL)",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO subcategories (id, name, category_id) VALUES ('s-reg', 'Regularization', 'c-dl')",
    )
    .execute(pool)
    .await
    .unwrap();

    for (id, name, definition, category) in [
        ("t-1", "Dropout", "Randomly zeroes activations", "c-dl"),
        ("t-2", "Batch Normalization", "Normalizes layer inputs", "c-dl"),
        ("t-3", "Weight Decay", "L2 penalty, an alternative to dropout", "c-dl"),
        ("t-4", "Variance", "Spread of a distribution", "c-stats"),
    ] {
        sqlx::query(
            "INSERT INTO terms (id, name, definition, short_definition, category_id) \
             VALUES (?, ?, ?, ?, ?)",
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

    sqlx::query("INSERT INTO term_subcategories (term_id, subcategory_id) VALUES ('t-1', 's-reg')")
        .execute(pool)
        .await
        .unwrap();
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Poll until the operation reaches a terminal state
pub async fn wait_for_terminal(pool: &SqlitePool, id: Uuid) -> BatchOperation {
    for _ in 0..250 {
        if let Some(operation) = load_operation(pool, id).await.unwrap() {
            if operation.is_terminal() {
                return operation;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("operation {} did not finish", id);
}

/// Answers every prompt with a fixed text
pub struct FixedCompletionClient {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl FixedCompletionClient {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FixedCompletionClient {
    async fn complete(
        &self,
        _model: &str,
        _system: &str,
        _user: &str,
    ) -> Result<Completion, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            content: self.reply.clone(),
            prompt_tokens: 100,
            completion_tokens: 50,
        })
    }
}

/// Holds every completion until `open` is called
pub struct GatedCompletionClient {
    pub reply: String,
    pub calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedCompletionClient {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }

    /// Poll until at least `n` completions have been requested
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..250 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} completion calls, saw {}", n, self.calls());
    }
}

#[async_trait]
impl CompletionClient for GatedCompletionClient {
    async fn complete(
        &self,
        _model: &str,
        _system: &str,
        _user: &str,
    ) -> Result<Completion, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Completion {
            content: self.reply.clone(),
            prompt_tokens: 100,
            completion_tokens: 50,
        })
    }
}
