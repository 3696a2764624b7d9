//! Event types and broadcast bus for batch operation progress
//!
//! Events are broadcast via EventBus and serialized for SSE transmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Glossary service events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GlossaryEvent {
    /// A batch operation was accepted and started
    OperationStarted {
        operation_id: Uuid,
        /// Operation kind ("process", "import", "generate")
        kind: String,
        source_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress within a running operation
    OperationProgress {
        operation_id: Uuid,
        current: usize,
        total: usize,
        percentage: f64,
        current_operation: String,
        timestamp: DateTime<Utc>,
    },

    /// Operation finished successfully
    OperationCompleted {
        operation_id: Uuid,
        /// Kind-specific summary (counts, output paths)
        summary: serde_json::Value,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Operation stopped on an error
    OperationFailed {
        operation_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Operation cancelled by an operator
    OperationCancelled {
        operation_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// One AI generation batch was written to disk
    GenerationBatchSaved {
        operation_id: Uuid,
        batch_number: usize,
        batch_total: usize,
        cells_updated: usize,
        cells_attempted: usize,
        cost_usd: f64,
        timestamp: DateTime<Utc>,
    },
}

impl GlossaryEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            GlossaryEvent::OperationStarted { .. } => "OperationStarted",
            GlossaryEvent::OperationProgress { .. } => "OperationProgress",
            GlossaryEvent::OperationCompleted { .. } => "OperationCompleted",
            GlossaryEvent::OperationFailed { .. } => "OperationFailed",
            GlossaryEvent::OperationCancelled { .. } => "OperationCancelled",
            GlossaryEvent::GenerationBatchSaved { .. } => "GenerationBatchSaved",
        }
    }

    /// Operation this event belongs to
    pub fn operation_id(&self) -> Uuid {
        match self {
            GlossaryEvent::OperationStarted { operation_id, .. }
            | GlossaryEvent::OperationProgress { operation_id, .. }
            | GlossaryEvent::OperationCompleted { operation_id, .. }
            | GlossaryEvent::OperationFailed { operation_id, .. }
            | GlossaryEvent::OperationCancelled { operation_id, .. }
            | GlossaryEvent::GenerationBatchSaved { operation_id, .. } => *operation_id,
        }
    }
}

/// Broadcast bus shared by the API and background operations
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GlossaryEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GlossaryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GlossaryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
