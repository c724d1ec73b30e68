//! Key assignment
//!
//! Every row of a shared dataset needs a key that linked widgets can agree
//! on. Keys come from an explicit list, from a column, or are derived from
//! the table's row labels with a positional fallback.

use ahash::AHashMap;
use arrow::record_batch::RecordBatch;
use ct_core::Key;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::table::{column_strings, row_labels};

/// Errors raised while assigning keys to rows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeyError {
    #[error("expected {expected} keys (one per row) but got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("key for row {row} is null")]
    NullKey { row: usize },

    #[error("duplicate key '{key}' at rows {first} and {second}")]
    DuplicateKey {
        key: String,
        first: usize,
        second: usize,
    },

    #[error("key column '{0}' not found")]
    MissingColumn(String),

    #[error("key column '{column}' cannot be read as strings: {message}")]
    UnreadableColumn { column: String, message: String },
}

/// Where a dataset's keys come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Row labels if the table has usable ones, else "1".."N"
    #[default]
    Derived,

    /// One value per row, in row order
    Explicit(Vec<Option<String>>),

    /// Values of a named column
    Column(String),
}

impl KeySource {
    /// Explicit keys from any displayable values
    pub fn explicit<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        KeySource::Explicit(values.into_iter().map(|v| Some(v.to_string())).collect())
    }
}

/// Produce one key per row of `batch`
pub fn assign_keys(batch: &RecordBatch, source: &KeySource) -> Result<Vec<Key>, KeyError> {
    let rows = batch.num_rows();
    match source {
        KeySource::Explicit(values) => validate_keys(values.clone(), rows),
        KeySource::Column(column) => validate_keys(column_strings(batch, column)?, rows),
        KeySource::Derived => {
            match row_labels(batch) {
                Some(Ok(labels)) => match validate_keys(labels, rows) {
                    Ok(keys) => return Ok(keys),
                    Err(err) => debug!("row labels not usable as keys ({}), falling back to positions", err),
                },
                Some(Err(err)) => debug!("row labels unreadable ({}), falling back to positions", err),
                None => {}
            }
            Ok(positional_keys(rows))
        }
    }
}

/// Keys "1".."N"
pub fn positional_keys(rows: usize) -> Vec<Key> {
    (1..=rows).map(|i| Key::new(i.to_string())).collect()
}

/// Check that values line up with the rows, are present and are distinct
pub fn validate_keys(values: Vec<Option<String>>, rows: usize) -> Result<Vec<Key>, KeyError> {
    if values.len() != rows {
        return Err(KeyError::LengthMismatch {
            expected: rows,
            actual: values.len(),
        });
    }

    let mut seen: AHashMap<String, usize> = AHashMap::with_capacity(rows);
    let mut keys = Vec::with_capacity(rows);
    for (row, value) in values.into_iter().enumerate() {
        let value = value.ok_or(KeyError::NullKey { row })?;
        if let Some(&first) = seen.get(&value) {
            return Err(KeyError::DuplicateKey {
                key: value,
                first,
                second: row,
            });
        }
        seen.insert(value.clone(), row);
        keys.push(Key::new(value));
    }
    Ok(keys)
}
