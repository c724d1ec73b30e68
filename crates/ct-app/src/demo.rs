//! Demo data: a small earthquake catalogue shared by two widgets

use std::sync::Arc;
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use anyhow::Result;

const QUAKES: &[(i64, f64, f64, f64, &str)] = &[
    (1, -20.42, 181.62, 4.8, "Fiji"),
    (2, -20.62, 181.03, 4.2, "Fiji"),
    (3, -26.00, 184.10, 5.4, "Tonga"),
    (4, -17.97, 181.66, 4.1, "Fiji"),
    (5, -20.42, 181.96, 4.0, "Fiji"),
    (6, -19.68, 184.31, 4.2, "Tonga"),
    (7, -11.70, 166.10, 4.8, "Vanuatu"),
    (8, -28.11, 181.93, 4.4, "Kermadec"),
];

/// Catalogue with an `id` column usable as row keys
pub fn quakes() -> Result<RecordBatch> {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("lat", DataType::Float64, false),
        Field::new("long", DataType::Float64, false),
        Field::new("mag", DataType::Float64, false),
        Field::new("region", DataType::Utf8, false),
    ]);

    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from_iter_values(QUAKES.iter().map(|q| q.0))),
            Arc::new(Float64Array::from_iter_values(QUAKES.iter().map(|q| q.1))),
            Arc::new(Float64Array::from_iter_values(QUAKES.iter().map(|q| q.2))),
            Arc::new(Float64Array::from_iter_values(QUAKES.iter().map(|q| q.3))),
            Arc::new(StringArray::from_iter_values(QUAKES.iter().map(|q| q.4))),
        ],
    )?;
    Ok(batch)
}

/// Keys of the quakes at or above a magnitude
pub fn strong_quakes(min_mag: f64) -> Vec<String> {
    QUAKES
        .iter()
        .filter(|q| q.3 >= min_mag)
        .map(|q| q.0.to_string())
        .collect()
}
