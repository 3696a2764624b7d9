//! Background batch operations
//!
//! Admin requests to process, import, split or AI-fill a glossary file run as
//! `BatchOperation`s on background tasks. `OperationTracker` owns the
//! persisted record and broadcasts every change; the executors drive the
//! pipeline services and report through it.

pub mod executors;
pub mod tracker;

pub use executors::{
    execute_generate, execute_import, execute_process, execute_split, GenerateRequest,
    ImportRequest, ProcessRequest, SplitRequest,
};
pub use tracker::{OperationObserver, OperationTracker};
