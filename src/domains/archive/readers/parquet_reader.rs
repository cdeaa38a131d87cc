use crate::domains::archive::types::TableSnapshot;
use crate::types::{Record, Value};
use arrow::array::*;
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;
use thiserror::Error;

/// Why a table entry could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: DataType },

    #[error("{0}")]
    Snapshot(String),
}

/// Decode a Parquet file into a snapshot, rows in file order.
pub fn decode_snapshot<R: ChunkReader + 'static>(input: R) -> Result<TableSnapshot, DecodeError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(input)?;
    let columns: Vec<String> = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut batch_rows = vec![Record::new(); batch.num_rows()];

        for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
            for (row_idx, row) in batch_rows.iter_mut().enumerate() {
                row.insert(field.name().clone(), cell_value(field.name(), array.as_ref(), row_idx)?);
            }
        }
        rows.extend(batch_rows);
    }

    TableSnapshot::with_columns(columns, rows).map_err(|e| DecodeError::Snapshot(e.to_string()))
}

fn cell_value(column: &str, array: &dyn Array, idx: usize) -> Result<Value, DecodeError> {
    if array.is_null(idx) {
        return Ok(Value::Null);
    }

    let unsupported = || DecodeError::UnsupportedType {
        column: column.to_string(),
        data_type: array.data_type().clone(),
    };
    let any = array.as_any();

    let value = match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Boolean(any.downcast_ref::<BooleanArray>().ok_or_else(unsupported)?.value(idx)),
        DataType::Int32 => Value::Integer(any.downcast_ref::<Int32Array>().ok_or_else(unsupported)?.value(idx) as i64),
        DataType::Int64 => Value::Integer(any.downcast_ref::<Int64Array>().ok_or_else(unsupported)?.value(idx)),
        DataType::Float32 => Value::Float(any.downcast_ref::<Float32Array>().ok_or_else(unsupported)?.value(idx) as f64),
        DataType::Float64 => Value::Float(any.downcast_ref::<Float64Array>().ok_or_else(unsupported)?.value(idx)),
        DataType::Utf8 => Value::Text(any.downcast_ref::<StringArray>().ok_or_else(unsupported)?.value(idx).to_string()),
        DataType::LargeUtf8 => {
            Value::Text(any.downcast_ref::<LargeStringArray>().ok_or_else(unsupported)?.value(idx).to_string())
        }
        DataType::Binary => Value::Bytes(any.downcast_ref::<BinaryArray>().ok_or_else(unsupported)?.value(idx).to_vec()),
        DataType::LargeBinary => {
            Value::Bytes(any.downcast_ref::<LargeBinaryArray>().ok_or_else(unsupported)?.value(idx).to_vec())
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = any
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(unsupported)?
                .value(idx);
            Value::Timestamp(DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(unsupported)?)
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let millis = any
                .downcast_ref::<TimestampMillisecondArray>()
                .ok_or_else(unsupported)?
                .value(idx);
            Value::Timestamp(DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(unsupported)?)
        }
        _ => return Err(unsupported()),
    };

    Ok(value)
}
