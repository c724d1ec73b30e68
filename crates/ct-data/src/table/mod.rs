//! Table helpers for reading key material out of record batches

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::keys::KeyError;

/// Schema metadata entry naming the column that holds a table's row labels
pub const ROW_LABELS_METADATA_KEY: &str = "crosstalk.row_labels";

/// Read a column as optional strings, casting non-string columns
pub fn column_strings(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>, KeyError> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| KeyError::MissingColumn(name.to_string()))?;

    let unreadable = |message: String| KeyError::UnreadableColumn {
        column: name.to_string(),
        message,
    };

    let converted = cast(column.as_ref(), &DataType::Utf8).map_err(|e| unreadable(e.to_string()))?;
    let strings = converted
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| unreadable("cast did not produce a UTF-8 array".to_string()))?;

    Ok(strings.iter().map(|value| value.map(str::to_string)).collect())
}

/// Name of the row label column declared in the schema metadata
pub fn row_label_column(batch: &RecordBatch) -> Option<String> {
    batch.schema().metadata().get(ROW_LABELS_METADATA_KEY).cloned()
}

/// Row labels of a table, if it declares any
pub fn row_labels(batch: &RecordBatch) -> Option<Result<Vec<Option<String>>, KeyError>> {
    row_label_column(batch).map(|column| column_strings(batch, &column))
}

/// Mark `column` as the row labels of `batch`
pub fn with_row_labels(batch: &RecordBatch, column: &str) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    schema.index_of(column)?;

    let mut metadata = schema.metadata().clone();
    metadata.insert(ROW_LABELS_METADATA_KEY.to_string(), column.to_string());
    let labelled = Schema::new_with_metadata(schema.fields().clone(), metadata);
    batch.clone().with_schema(Arc::new(labelled))
}
