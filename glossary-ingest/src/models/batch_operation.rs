//! Batch operation state machine
//!
//! Long running admin work (processing a spreadsheet, importing, AI fill)
//! runs as a `BatchOperation`:
//! PENDING → RUNNING → COMPLETED | CANCELLED | FAILED

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Process,
    Import,
    Generate,
    Split,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Process => "process",
            OperationKind::Import => "import",
            OperationKind::Generate => "generate",
            OperationKind::Split => "split",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "PENDING",
            OperationState::Running => "RUNNING",
            OperationState::Completed => "COMPLETED",
            OperationState::Cancelled => "CANCELLED",
            OperationState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub operation_id: Uuid,
    pub old_state: OperationState,
    pub new_state: OperationState,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub current: usize,
    pub total: usize,
    /// 0.0 - 100.0
    pub percentage: f64,
    pub current_operation: String,
    pub elapsed_seconds: u64,
    pub estimated_remaining_seconds: Option<u64>,
}

impl Default for OperationProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            current_operation: String::from("Queued"),
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub state: OperationState,
    /// Input file the operation reads
    pub source_path: String,
    /// Request parameters as submitted
    pub parameters: serde_json::Value,
    pub progress: OperationProgress,
    pub errors: Vec<OperationError>,
    /// Accumulated AI spend (generate only)
    pub cost_usd: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchOperation {
    pub fn new(kind: OperationKind, source_path: String, parameters: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: OperationState::Pending,
            source_path,
            parameters,
            progress: OperationProgress::default(),
            errors: Vec::new(),
            cost_usd: 0.0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn transition_to(&mut self, new_state: OperationState) -> StateTransition {
        let transition = StateTransition {
            operation_id: self.id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if self.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    pub fn update_progress(&mut self, current: usize, total: usize, operation: String) {
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation;

        let elapsed = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        if current > 0 && total > current {
            let rate = elapsed as f64 / current as f64;
            self.progress.estimated_remaining_seconds = Some(((total - current) as f64 * rate) as u64);
        } else {
            self.progress.estimated_remaining_seconds = None;
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(OperationError {
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            OperationState::Completed | OperationState::Cancelled | OperationState::Failed
        )
    }

    pub fn duration_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }
}
