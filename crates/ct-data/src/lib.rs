//! Shared datasets for linked widgets
//!
//! Wraps Arrow record batches with row keys and a group name so that
//! widgets built on `ct-core` can link their selections and filters.

pub mod config;
pub mod dataset;
pub mod keys;
pub mod table;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-exports
pub use config::DatasetConfig;
pub use dataset::SharedDataset;
pub use keys::{assign_keys, positional_keys, KeyError, KeySource};
pub use table::{with_row_labels, ROW_LABELS_METADATA_KEY};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}
