//! Batch runner for AI cell fill
//!
//! Missing cells are split into batches of `batch_size`; inside a batch up
//! to `workers` completions run concurrently. After every batch the results
//! are written into the sheet, the checkpoint and the sheet are saved, and
//! the observer is told. Safety controls stop the run between batches or
//! cells: cancellation, error rate and cost limit.

use super::checkpoint::Checkpoint;
use super::client::{Completion, CompletionClient};
use super::planner::{find_missing_cells, CellTask, FillOrder, SYSTEM_PROMPT};
use crate::table::{SheetTable, TableFormat};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use glossary_common::config::TomlConfig;
use glossary_common::{Error, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Content this short is treated as a failed generation
const MIN_CONTENT_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub primary_model: String,
    pub fallback_model: String,
    pub workers: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_error_rate: f64,
    pub cost_limit_usd: Option<f64>,
    pub prompt_cost_per_1k_tokens: f64,
    pub completion_cost_per_1k_tokens: f64,
    pub order: FillOrder,
}

impl GenerationSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            primary_model: config.openai.primary_model.clone(),
            fallback_model: config.openai.fallback_model.clone(),
            workers: config.generation.max_workers.max(1),
            batch_size: config.generation.effective_batch_size(),
            max_retries: config.generation.max_retries,
            retry_delay: Duration::from_secs(config.generation.retry_delay_secs),
            max_error_rate: config.generation.max_error_rate,
            cost_limit_usd: config.generation.cost_limit_usd,
            prompt_cost_per_1k_tokens: config.openai.prompt_cost_per_1k_tokens,
            completion_cost_per_1k_tokens: config.openai.completion_cost_per_1k_tokens,
            order: FillOrder::TopDown,
        }
    }

    /// Override worker count; the batch size follows unless set explicitly
    pub fn with_workers(mut self, workers: Option<usize>, batch_size: Option<usize>) -> Self {
        if let Some(workers) = workers.filter(|w| *w > 0) {
            self.workers = workers;
            self.batch_size = workers * 3;
        }
        if let Some(batch_size) = batch_size.filter(|b| *b > 0) {
            self.batch_size = batch_size;
        }
        self
    }

    pub fn with_order(mut self, order: FillOrder) -> Self {
        self.order = order;
        self
    }

    pub fn cost_of(&self, completion: &Completion) -> f64 {
        completion.prompt_tokens as f64 / 1000.0 * self.prompt_cost_per_1k_tokens
            + completion.completion_tokens as f64 / 1000.0 * self.completion_cost_per_1k_tokens
    }

    fn cost_limit_reached(&self, spent: f64) -> bool {
        self.cost_limit_usd.is_some_and(|limit| spent >= limit)
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// Result of generating one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellOutcome {
    pub task: CellTask,
    /// `None` when every attempt failed
    pub content: Option<String>,
    pub cost_usd: f64,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Stopped by cancellation while backing off; neither filled nor failed
    pub cancelled: bool,
}

/// Generate the content of one cell with retry and model fallback
///
/// The primary model is used until the final attempt, which uses the
/// fallback model. Content of `MIN_CONTENT_CHARS` or fewer characters is
/// retried at once; on the final attempt it is returned as is. Request
/// errors back off `retry_delay * (attempt + 1)`.
pub async fn fill_cell(
    client: &dyn CompletionClient,
    task: &CellTask,
    settings: &GenerationSettings,
    cancel: &CancellationToken,
) -> CellOutcome {
    let prompt = task.user_prompt();
    let mut outcome = CellOutcome {
        task: task.clone(),
        content: None,
        cost_usd: 0.0,
        attempts: 0,
        last_error: None,
        cancelled: false,
    };

    for attempt in 0..=settings.max_retries {
        let is_final = attempt == settings.max_retries;
        let model = if is_final {
            &settings.fallback_model
        } else {
            &settings.primary_model
        };
        outcome.attempts = attempt + 1;

        match client.complete(model, SYSTEM_PROMPT, &prompt).await {
            Ok(completion) => {
                outcome.cost_usd += settings.cost_of(&completion);
                let content = completion.content.trim();
                if content.chars().count() > MIN_CONTENT_CHARS || is_final {
                    if !content.is_empty() {
                        outcome.content = Some(content.to_string());
                    }
                    return outcome;
                }
                debug!(
                    row = task.row,
                    col = task.col,
                    attempt,
                    "Generated content too short, retrying"
                );
            }
            Err(e) => {
                warn!(
                    row = task.row,
                    col = task.col,
                    attempt,
                    model = %model,
                    error = %e,
                    "Completion failed"
                );
                outcome.last_error = Some(e.to_string());
                if is_final {
                    return outcome;
                }
                let delay = settings.retry_delay * (attempt + 1);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.cancelled = true;
                        return outcome;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    outcome
}

/// State after one saved batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// 1-based
    pub batch_number: usize,
    pub batch_total: usize,
    pub cells_attempted: usize,
    pub cells_updated: usize,
    pub total_attempted: usize,
    pub total_updated: usize,
    pub total_cells: usize,
    /// Cumulative spend for the run
    pub cost_usd: f64,
}

#[async_trait]
pub trait GenerationObserver: Send + Sync {
    async fn on_start(&self, _total_cells: usize, _batch_total: usize) {}

    async fn on_batch(&self, report: &BatchReport);
}

pub struct NoopObserver;

#[async_trait]
impl GenerationObserver for NoopObserver {
    async fn on_batch(&self, _report: &BatchReport) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    CostLimitReached,
    ErrorRateExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub success: bool,
    pub status: RunStatus,
    pub input_file: String,
    pub checkpoint_file: String,
    pub missing_cells: usize,
    pub cells_attempted: usize,
    pub cells_updated: usize,
    pub cells_failed: usize,
    pub batches_completed: usize,
    pub batch_total: usize,
    pub stale_checkpoint_entries: usize,
    pub cost_usd: f64,
}

pub struct GenerationRunner<'a> {
    client: &'a dyn CompletionClient,
    settings: GenerationSettings,
    cancel: CancellationToken,
}

impl<'a> GenerationRunner<'a> {
    pub fn new(client: &'a dyn CompletionClient, settings: GenerationSettings) -> Self {
        Self {
            client,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Fill every missing cell of `input`, saving after each batch
    pub async fn run(
        &self,
        input: &Path,
        checkpoint_path: &Path,
        observer: &dyn GenerationObserver,
    ) -> Result<GenerationReport> {
        if TableFormat::from_path(input)? == TableFormat::Excel {
            return Err(Error::InvalidInput(
                "Excel files cannot be written back; convert to CSV first".to_string(),
            ));
        }

        let mut table = SheetTable::load(input)?;
        let mut checkpoint = Checkpoint::load(checkpoint_path)?;
        let stale = checkpoint.reconcile(&table)?;

        let tasks = find_missing_cells(&table, &checkpoint, self.settings.order);
        let batch_size = self.settings.batch_size.max(1);
        let workers = self.settings.workers.max(1);
        let batch_total = tasks.len().div_ceil(batch_size);

        info!(
            input = %input.display(),
            missing = tasks.len(),
            batches = batch_total,
            workers,
            batch_size,
            "Starting AI cell generation"
        );
        observer.on_start(tasks.len(), batch_total).await;

        let mut report = GenerationReport {
            success: true,
            status: RunStatus::Completed,
            input_file: input.display().to_string(),
            checkpoint_file: checkpoint_path.display().to_string(),
            missing_cells: tasks.len(),
            cells_attempted: 0,
            cells_updated: 0,
            cells_failed: 0,
            batches_completed: 0,
            batch_total,
            stale_checkpoint_entries: stale,
            cost_usd: 0.0,
        };

        for (index, batch) in tasks.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                report.status = RunStatus::Cancelled;
                break;
            }
            if self.settings.cost_limit_reached(report.cost_usd) {
                report.status = RunStatus::CostLimitReached;
                break;
            }

            let spent = Mutex::new(report.cost_usd);
            let outcomes: Vec<Option<CellOutcome>> = stream::iter(batch.iter().cloned())
                .map(|task| {
                    let spent = &spent;
                    async move {
                        let stop = self.cancel.is_cancelled()
                            || spent
                                .lock()
                                .map(|s| self.settings.cost_limit_reached(*s))
                                .unwrap_or(true);
                        if stop {
                            return None;
                        }
                        let outcome =
                            fill_cell(self.client, &task, &self.settings, &self.cancel).await;
                        if let Ok(mut s) = spent.lock() {
                            *s += outcome.cost_usd;
                        }
                        Some(outcome)
                    }
                })
                .buffer_unordered(workers)
                .collect()
                .await;

            let mut attempted = 0;
            let mut updated = 0;
            for outcome in outcomes.into_iter().flatten() {
                report.cost_usd += outcome.cost_usd;
                if outcome.cancelled {
                    continue;
                }
                attempted += 1;
                match outcome.content {
                    Some(content) => {
                        table.set_cell(outcome.task.data_index(), outcome.task.col, content);
                        checkpoint.mark(outcome.task.row, outcome.task.col);
                        updated += 1;
                    }
                    None => report.cells_failed += 1,
                }
            }

            checkpoint.save()?;
            table.save_atomic(input)?;

            report.cells_attempted += attempted;
            report.cells_updated += updated;
            report.batches_completed += 1;

            info!(
                batch = index + 1,
                batch_total,
                updated,
                attempted,
                cost_usd = report.cost_usd,
                "Saved generation batch"
            );
            observer
                .on_batch(&BatchReport {
                    batch_number: index + 1,
                    batch_total,
                    cells_attempted: attempted,
                    cells_updated: updated,
                    total_attempted: report.cells_attempted,
                    total_updated: report.cells_updated,
                    total_cells: report.missing_cells,
                    cost_usd: report.cost_usd,
                })
                .await;

            if attempted == batch.len() && report.cells_attempted > 0 {
                let error_rate = report.cells_failed as f64 / report.cells_attempted as f64;
                if error_rate > self.settings.max_error_rate {
                    warn!(
                        error_rate,
                        max_error_rate = self.settings.max_error_rate,
                        "Error rate exceeded, stopping generation"
                    );
                    report.status = RunStatus::ErrorRateExceeded;
                    break;
                }
            }
        }

        if report.status == RunStatus::Completed {
            if self.cancel.is_cancelled() && report.batches_completed < batch_total {
                report.status = RunStatus::Cancelled;
            } else if self.settings.cost_limit_reached(report.cost_usd)
                && report.cells_attempted < report.missing_cells
            {
                report.status = RunStatus::CostLimitReached;
            }
        }
        report.success = report.status == RunStatus::Completed;

        info!(
            status = ?report.status,
            updated = report.cells_updated,
            failed = report.cells_failed,
            cost_usd = report.cost_usd,
            "AI cell generation finished"
        );
        Ok(report)
    }
}
