//! Data models

pub mod batch_operation;
pub mod dataset;

pub use batch_operation::{
    BatchOperation, OperationError, OperationKind, OperationProgress, OperationState,
    StateTransition,
};
pub use dataset::{
    DatasetCategory, DatasetMetadata, DatasetSubcategory, DatasetTerm, ProcessedDataset,
};
