//! AI fill of missing glossary cells
//!
//! Empty content cells of a glossary sheet are filled by an OpenAI-compatible
//! chat completion API. Work is checkpointed per cell so interrupted runs
//! resume where they stopped, and both the sheet and the checkpoint are
//! saved atomically after every batch.

pub mod checkpoint;
pub mod client;
pub mod planner;
pub mod runner;

pub use checkpoint::{default_checkpoint_path, Checkpoint, DEFAULT_CHECKPOINT_FILE};
pub use client::{
    client_from_config, resolve_api_key, store_api_key, Completion, CompletionClient,
    GenerationError, OpenAiClient,
};
pub use planner::{find_missing_cells, CellTask, FillOrder, SYSTEM_PROMPT};
pub use runner::{
    fill_cell, BatchReport, CellOutcome, GenerationObserver, GenerationReport, GenerationRunner,
    GenerationSettings, NoopObserver, RunStatus,
};
