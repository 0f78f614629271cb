//! Result Converter Utilities
//!
//! Conversions between the JSON shape used by the query shell and the Arrow
//! record batches exchanged with the query engine.
//!
//! # Supported Conversions
//!
//! - `[FieldValue]` (request parameters) → one-row parameter `RecordBatch`
//! - `[RecordBatch]` (query results) → JSON rows
//!
//! # Example
//!
//! ```ignore
//! use hub_analytics::execution::result_converter::ResultConverter;
//!
//! let parameters = ResultConverter::parameters_to_record_batch(&[FieldValue::UInt(7)])?;
//! let rows = ResultConverter::batches_to_json_rows(&batches)?;
//! ```

use crate::core::FieldValue;
use arrow_array::{
    ArrayRef, Int64Array, NullArray, RecordBatch, RecordBatchOptions, StringArray, UInt64Array,
};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;

/// One result row keyed by column name.
pub type JsonRow = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stateless converter between request/response JSON and Arrow batches.
pub struct ResultConverter;

impl ResultConverter {
    /// Name of the placeholder column at zero-based `index`.
    pub fn parameter_name(index: usize) -> String {
        format!("${}", index + 1)
    }

    /// Builds a one-row batch with one column per parameter.
    ///
    /// # Arguments
    ///
    /// * `parameters` - Positional parameter values, bound to `$1..$n`
    ///
    /// # Returns
    ///
    /// A batch with columns `$1..$n` typed UInt64, Int64, Utf8 or Null.
    pub fn parameters_to_record_batch(
        parameters: &[FieldValue],
    ) -> Result<RecordBatch, ConversionError> {
        let mut fields = Vec::with_capacity(parameters.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(parameters.len());

        for (index, parameter) in parameters.iter().enumerate() {
            let (data_type, column): (DataType, ArrayRef) = match parameter {
                FieldValue::UInt(v) => (DataType::UInt64, Arc::new(UInt64Array::from(vec![*v]))),
                FieldValue::Int(v) => (DataType::Int64, Arc::new(Int64Array::from(vec![*v]))),
                FieldValue::Str(v) => {
                    (DataType::Utf8, Arc::new(StringArray::from(vec![v.as_str()])))
                }
                FieldValue::Null => (DataType::Null, Arc::new(NullArray::new(1))),
            };
            fields.push(Field::new(Self::parameter_name(index), data_type, true));
            columns.push(column);
        }

        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(1));
        Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
    }

    /// Renders result batches as JSON objects, one per row.
    ///
    /// Null cells are omitted from their row.
    pub fn batches_to_json_rows(batches: &[RecordBatch]) -> Result<Vec<JsonRow>, ConversionError> {
        let mut writer = arrow_json::ArrayWriter::new(Vec::new());
        let batches: Vec<&RecordBatch> = batches.iter().collect();
        writer.write_batches(&batches)?;
        writer.finish()?;

        let buffer = writer.into_inner();
        if buffer.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&buffer)?)
    }
}
