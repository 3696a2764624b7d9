//! Background executors for admin batch operations
//!
//! Each executor runs on a spawned task, drives one pipeline service and
//! reports through its `OperationTracker`. Blocking file work runs on
//! `spawn_blocking`, with chunk progress forwarded over a channel.

use super::tracker::{OperationObserver, OperationTracker};
use crate::generation::{
    default_checkpoint_path, FillOrder, GenerationRunner, GenerationSettings, RunStatus,
};
use crate::services::{
    apply_changes, import_dataset, process_file, split_dataset, ImportOptions,
    IncrementalImporter, ProcessOptions,
};
use crate::AppState;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRequest {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub max_chunks: Option<usize>,
    #[serde(default)]
    pub import_into_database: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub path: String,
    #[serde(default)]
    pub force_all: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitRequest {
    pub input: String,
    pub output_dir: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub path: String,
    /// "topdown" or "bottomup"
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub checkpoint_path: Option<String>,
}

impl GenerateRequest {
    pub fn fill_order(&self) -> glossary_common::Result<FillOrder> {
        match &self.mode {
            Some(mode) => mode.parse(),
            None => Ok(FillOrder::TopDown),
        }
    }

    pub fn checkpoint(&self) -> PathBuf {
        match &self.checkpoint_path {
            Some(path) => PathBuf::from(path),
            None => default_checkpoint_path(std::path::Path::new(&self.path)),
        }
    }
}

enum Outcome {
    Completed(Value),
    Cancelled,
    Failed(String),
}

async fn report_chunks(
    tracker: &OperationTracker,
    mut rx: mpsc::UnboundedReceiver<(usize, usize)>,
    label: &str,
) {
    while let Some((done, total)) = rx.recv().await {
        let message = format!("{} {} of {}", label, done, total);
        if let Err(e) = tracker.progress(done, total, message).await {
            warn!(operation_id = %tracker.id(), error = %e, "Failed to record progress");
        }
    }
}

/// Record the final state and release the cancellation token
async fn finish(
    state: &AppState,
    tracker: &OperationTracker,
    cancel: &CancellationToken,
    result: anyhow::Result<Outcome>,
) {
    let recorded = match result {
        Ok(_) if cancel.is_cancelled() => tracker.cancel().await,
        Ok(Outcome::Completed(summary)) => tracker.complete(summary).await,
        Ok(Outcome::Cancelled) => tracker.cancel().await,
        Ok(Outcome::Failed(message)) => tracker.fail(&message).await,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            tracker.fail(&format!("{:#}", e)).await
        }
    };

    if let Err(e) = recorded {
        error!(
            operation_id = %tracker.id(),
            error = %e,
            "Failed to record final operation state"
        );
        *state.last_error.write().await = Some(e.to_string());
    }

    state.cancellation_tokens.write().await.remove(&tracker.id());
}

/// Spreadsheet → dataset JSON, optionally imported into the database
pub async fn execute_process(
    state: AppState,
    tracker: Arc<OperationTracker>,
    request: ProcessRequest,
    cancel: CancellationToken,
) {
    let result = process(&state, &tracker, request, &cancel).await;
    finish(&state, &tracker, &cancel, result).await;
}

async fn process(
    state: &AppState,
    tracker: &OperationTracker,
    request: ProcessRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    if !tracker.start().await? {
        return Ok(Outcome::Cancelled);
    }

    let input = PathBuf::from(&request.input);
    let output = PathBuf::from(&request.output);
    let mut options = ProcessOptions::default();
    if let Some(chunk_size) = request.chunk_size.filter(|c| *c > 0) {
        options.chunk_size = chunk_size;
    }
    options.max_chunks = request.max_chunks;

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::task::spawn_blocking(move || {
        process_file(&input, &output, &options, |done, total| {
            let _ = tx.send((done, total));
        })
    });
    report_chunks(tracker, rx, "Processing chunk").await;
    let (dataset, summary) = worker.await.context("Processing task panicked")??;

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let mut result = serde_json::to_value(&summary)?;
    if request.import_into_database {
        let terms = dataset.terms.len();
        tracker
            .progress(terms, terms, "Importing into database".to_string())
            .await?;
        let imported = import_dataset(&state.db, &dataset).await?;
        result["imported"] = serde_json::to_value(&imported)?;
    }
    Ok(Outcome::Completed(result))
}

/// Change-detecting import of a glossary sheet
pub async fn execute_import(
    state: AppState,
    tracker: Arc<OperationTracker>,
    request: ImportRequest,
    cancel: CancellationToken,
) {
    let result = import(&state, &tracker, request, &cancel).await;
    finish(&state, &tracker, &cancel, result).await;
}

async fn import(
    state: &AppState,
    tracker: &OperationTracker,
    request: ImportRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    if !tracker.start().await? {
        return Ok(Outcome::Cancelled);
    }

    let mut options = ImportOptions::new(state.root_folder.join("import"));
    options.force_all = request.force_all;
    options.dry_run = request.dry_run;
    if let Some(chunk_size) = request.chunk_size.filter(|c| *c > 0) {
        options.chunk_size = chunk_size;
    }

    let input = PathBuf::from(&request.path);
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::task::spawn_blocking(move || {
        IncrementalImporter::new(options).run(&input, |done, total| {
            let _ = tx.send((done, total));
        })
    });
    report_chunks(tracker, rx, "Comparing chunk").await;
    let (plan, summary) = worker.await.context("Import task panicked")??;

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    let mut result = serde_json::to_value(&summary)?;
    if !request.dry_run {
        let applied = apply_changes(&state.db, &plan).await?;
        result["applied_terms"] = Value::from(applied);
    }
    Ok(Outcome::Completed(result))
}

/// Dataset JSON → chunk files
pub async fn execute_split(
    state: AppState,
    tracker: Arc<OperationTracker>,
    request: SplitRequest,
    cancel: CancellationToken,
) {
    let result = split(&tracker, request).await;
    finish(&state, &tracker, &cancel, result).await;
}

async fn split(tracker: &OperationTracker, request: SplitRequest) -> anyhow::Result<Outcome> {
    if !tracker.start().await? {
        return Ok(Outcome::Cancelled);
    }

    let input = PathBuf::from(&request.input);
    let output_dir = PathBuf::from(&request.output_dir);
    let chunk_size = request.chunk_size.filter(|c| *c > 0).unwrap_or(1000);

    let summary = tokio::task::spawn_blocking(move || split_dataset(&input, &output_dir, chunk_size))
        .await
        .context("Split task panicked")??;
    Ok(Outcome::Completed(serde_json::to_value(&summary)?))
}

/// AI fill of missing cells
///
/// Holds `permit` for the whole run, bounding concurrent generation runs.
pub async fn execute_generate(
    state: AppState,
    tracker: Arc<OperationTracker>,
    request: GenerateRequest,
    cancel: CancellationToken,
    permit: OwnedSemaphorePermit,
) {
    let result = generate(&state, &tracker, request, &cancel).await;
    drop(permit);
    finish(&state, &tracker, &cancel, result).await;
}

async fn generate(
    state: &AppState,
    tracker: &OperationTracker,
    request: GenerateRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<Outcome> {
    let client = state
        .completion_client
        .clone()
        .context("No OpenAI API key configured")?;

    if !tracker.start().await? {
        return Ok(Outcome::Cancelled);
    }

    let settings = GenerationSettings::from_config(&state.config)
        .with_workers(request.workers, request.batch_size)
        .with_order(request.fill_order()?);
    let runner = GenerationRunner::new(client.as_ref(), settings).with_cancellation(cancel.clone());
    let observer = OperationObserver::new(tracker);

    let input = PathBuf::from(&request.path);
    let report = runner.run(&input, &request.checkpoint(), &observer).await?;
    tracker.set_cost(report.cost_usd).await;

    let summary = serde_json::to_value(&report)?;
    Ok(match report.status {
        RunStatus::Completed => Outcome::Completed(summary),
        RunStatus::Cancelled => Outcome::Cancelled,
        RunStatus::CostLimitReached => {
            tracker.add_error("Cost limit reached").await;
            Outcome::Completed(summary)
        }
        RunStatus::ErrorRateExceeded => Outcome::Failed(format!(
            "Error rate exceeded: {} of {} cells failed",
            report.cells_failed, report.cells_attempted
        )),
    })
}
