//! Observable in-memory tables and live views for the visualization platform

pub mod config;
pub mod dataset;
pub mod query;
pub mod queue;
pub mod source;
pub mod view;

use dv_core::{ConversionError, EventError, Id};
use thiserror::Error;

// Re-exports
pub use config::{DataSetOptions, DataViewOptions, QueueOptions};
pub use dataset::{DataInput, DataSet};
pub use query::{Comparator, Fields, Filter, Order, Query};
pub use queue::{ChangeQueue, DataMutations, Method, QueuedCall};
pub use source::DataSource;
pub use view::DataView;

/// Errors that can occur in data operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Cannot add item: item with id {0} already exists")]
    DuplicateId(Id),

    #[error("Item has no '{field}' field")]
    MissingField { field: String },

    #[error("Item with id {0} does not exist")]
    MissingId(Id),

    #[error("Unsupported input: expected {expected}, got {got}")]
    UnsupportedInput { expected: &'static str, got: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("{} queued call(s) failed during flush", .0.len())]
    QueueFlush(Vec<DataError>),
}
