//! Persisted, broadcast state of one batch operation

use crate::db::operations::save_operation;
use crate::generation::{BatchReport, GenerationObserver};
use crate::models::{BatchOperation, OperationState};
use async_trait::async_trait;
use chrono::Utc;
use glossary_common::events::{EventBus, GlossaryEvent};
use glossary_common::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct OperationTracker {
    id: Uuid,
    db: SqlitePool,
    event_bus: EventBus,
    operation: Mutex<BatchOperation>,
}

impl OperationTracker {
    pub fn new(db: SqlitePool, event_bus: EventBus, operation: BatchOperation) -> Self {
        Self {
            id: operation.id,
            db,
            event_bus,
            operation: Mutex::new(operation),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Save unless the stored row is already terminal
    ///
    /// A refused write means the operation was finalized elsewhere (e.g.
    /// cancelled through the API), so callers skip their event.
    async fn persist(&self, operation: &BatchOperation) -> Result<bool> {
        let written = save_operation(&self.db, operation).await?;
        if !written {
            debug!(
                operation_id = %self.id,
                state = operation.state.as_str(),
                "Operation already finalized, update skipped"
            );
        }
        Ok(written)
    }

    /// PENDING → RUNNING
    ///
    /// Returns `false` when the operation was finalized before it started.
    pub async fn start(&self) -> Result<bool> {
        let mut operation = self.operation.lock().await;
        operation.transition_to(OperationState::Running);
        operation.progress.current_operation = "Starting".to_string();
        if !self.persist(&operation).await? {
            return Ok(false);
        }

        self.event_bus.emit_lossy(GlossaryEvent::OperationStarted {
            operation_id: self.id,
            kind: operation.kind.as_str().to_string(),
            source_path: operation.source_path.clone(),
            timestamp: Utc::now(),
        });
        info!(operation_id = %self.id, kind = operation.kind.as_str(), "Operation started");
        Ok(true)
    }

    pub async fn progress(&self, current: usize, total: usize, message: String) -> Result<()> {
        let mut operation = self.operation.lock().await;
        operation.update_progress(current, total, message);
        if !self.persist(&operation).await? {
            return Ok(());
        }

        self.event_bus.emit_lossy(GlossaryEvent::OperationProgress {
            operation_id: self.id,
            current,
            total,
            percentage: operation.progress.percentage,
            current_operation: operation.progress.current_operation.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn set_cost(&self, cost_usd: f64) {
        self.operation.lock().await.cost_usd = cost_usd;
    }

    pub async fn add_error(&self, message: impl Into<String>) {
        self.operation.lock().await.add_error(message);
    }

    pub async fn complete(&self, summary: serde_json::Value) -> Result<()> {
        let mut operation = self.operation.lock().await;
        operation.transition_to(OperationState::Completed);
        operation.progress.current_operation = "Completed".to_string();
        if !self.persist(&operation).await? {
            return Ok(());
        }

        let duration_seconds = operation.duration_seconds();
        self.event_bus.emit_lossy(GlossaryEvent::OperationCompleted {
            operation_id: self.id,
            summary,
            duration_seconds,
            timestamp: Utc::now(),
        });
        info!(operation_id = %self.id, duration_seconds, "Operation completed");
        Ok(())
    }

    pub async fn fail(&self, error: &str) -> Result<()> {
        let mut operation = self.operation.lock().await;
        operation.add_error(error);
        operation.transition_to(OperationState::Failed);
        operation.progress.current_operation = format!("Failed: {}", error);
        if !self.persist(&operation).await? {
            return Ok(());
        }

        self.event_bus.emit_lossy(GlossaryEvent::OperationFailed {
            operation_id: self.id,
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        warn!(operation_id = %self.id, error, "Operation failed");
        Ok(())
    }

    pub async fn cancel(&self) -> Result<()> {
        let mut operation = self.operation.lock().await;
        operation.transition_to(OperationState::Cancelled);
        operation.progress.current_operation = "Cancelled".to_string();
        if !self.persist(&operation).await? {
            return Ok(());
        }

        self.event_bus.emit_lossy(GlossaryEvent::OperationCancelled {
            operation_id: self.id,
            timestamp: Utc::now(),
        });
        info!(operation_id = %self.id, "Operation cancelled");
        Ok(())
    }
}

/// Reports generation batches as operation progress
pub struct OperationObserver<'a> {
    tracker: &'a OperationTracker,
}

impl<'a> OperationObserver<'a> {
    pub fn new(tracker: &'a OperationTracker) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl GenerationObserver for OperationObserver<'_> {
    async fn on_start(&self, total_cells: usize, batch_total: usize) {
        let message = format!("{} missing cells in {} batches", total_cells, batch_total);
        if let Err(e) = self.tracker.progress(0, total_cells, message).await {
            warn!(operation_id = %self.tracker.id(), error = %e, "Failed to record progress");
        }
    }

    async fn on_batch(&self, report: &BatchReport) {
        self.tracker.set_cost(report.cost_usd).await;

        self.tracker.event_bus.emit_lossy(GlossaryEvent::GenerationBatchSaved {
            operation_id: self.tracker.id(),
            batch_number: report.batch_number,
            batch_total: report.batch_total,
            cells_updated: report.cells_updated,
            cells_attempted: report.cells_attempted,
            cost_usd: report.cost_usd,
            timestamp: Utc::now(),
        });

        let message = format!("Batch {} of {} saved", report.batch_number, report.batch_total);
        if let Err(e) = self
            .tracker
            .progress(report.total_attempted, report.total_cells, message)
            .await
        {
            warn!(operation_id = %self.tracker.id(), error = %e, "Failed to record progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operations::load_operation;
    use crate::models::OperationKind;
    use glossary_common::db::init_in_memory;

    #[tokio::test]
    async fn test_lifecycle_is_persisted_and_broadcast() {
        let pool = init_in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let operation = BatchOperation::new(
            OperationKind::Process,
            "/data/terms.csv".to_string(),
            serde_json::json!({}),
        );
        let tracker = OperationTracker::new(pool.clone(), bus, operation);

        tracker.start().await.unwrap();
        tracker.progress(1, 2, "Processing chunk 1 of 2".to_string()).await.unwrap();
        tracker.complete(serde_json::json!({"terms": 10})).await.unwrap();

        let types: Vec<String> = (0..3)
            .map(|_| rx.try_recv().unwrap().event_type().to_string())
            .collect();
        assert_eq!(types, vec!["OperationStarted", "OperationProgress", "OperationCompleted"]);

        let stored = load_operation(&pool, tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, OperationState::Completed);
        assert_eq!(stored.progress.percentage, 50.0);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let pool = init_in_memory().await.unwrap();
        let operation = BatchOperation::new(
            OperationKind::Import,
            "/data/terms.csv".to_string(),
            serde_json::json!({}),
        );
        let tracker = OperationTracker::new(pool.clone(), EventBus::new(4), operation);
        tracker.start().await.unwrap();
        tracker.fail("File not found").await.unwrap();

        let stored = load_operation(&pool, tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, OperationState::Failed);
        assert_eq!(stored.errors[0].message, "File not found");
    }

    #[tokio::test]
    async fn test_updates_after_external_cancel_are_dropped() {
        let pool = init_in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let operation = BatchOperation::new(
            OperationKind::Generate,
            "/data/terms.csv".to_string(),
            serde_json::json!({}),
        );
        let mut cancelled = operation.clone();
        let tracker = OperationTracker::new(pool.clone(), bus, operation);
        assert!(tracker.start().await.unwrap());
        rx.try_recv().unwrap();

        cancelled.transition_to(OperationState::Cancelled);
        save_operation(&pool, &cancelled).await.unwrap();

        tracker.progress(3, 4, "Batch 3 of 4 saved".to_string()).await.unwrap();
        tracker.cancel().await.unwrap();
        assert!(rx.try_recv().is_err());

        let stored = load_operation(&pool, tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, OperationState::Cancelled);
        assert_eq!(stored.progress.current, 0);
    }

    #[tokio::test]
    async fn test_start_refused_when_cancelled_before_running() {
        let pool = init_in_memory().await.unwrap();
        let mut operation = BatchOperation::new(
            OperationKind::Split,
            "/data/terms.json".to_string(),
            serde_json::json!({}),
        );
        let pending = operation.clone();
        operation.transition_to(OperationState::Cancelled);
        save_operation(&pool, &operation).await.unwrap();

        let tracker = OperationTracker::new(pool.clone(), EventBus::new(4), pending);
        assert!(!tracker.start().await.unwrap());

        let stored = load_operation(&pool, tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, OperationState::Cancelled);
    }
}
