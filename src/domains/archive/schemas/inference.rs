use crate::domains::archive::types::TableSnapshot;
use crate::types::{Record, ValueKind};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::collections::HashMap;
use std::sync::Arc;

/// Schema metadata key recording the archive format revision
pub const FORMAT_VERSION_KEY: &str = "table_archive.version";
pub const FORMAT_VERSION: &str = "1";

/// Timezone attached to every timestamp column
pub const TIMESTAMP_TZ: &str = "UTC";

/// Storage type chosen for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
    Timestamp,
}

impl ColumnType {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Binary => DataType::Binary,
            ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some(TIMESTAMP_TZ.into())),
        }
    }

    /// Fold one more observed value kind into the column type.
    fn widen(current: Option<ColumnType>, kind: ValueKind) -> Option<ColumnType> {
        let observed = match kind {
            ValueKind::Null => return current,
            ValueKind::Boolean => ColumnType::Boolean,
            ValueKind::Integer => ColumnType::Int64,
            ValueKind::Float => ColumnType::Float64,
            ValueKind::Text => ColumnType::Utf8,
            ValueKind::Bytes => ColumnType::Binary,
            ValueKind::Timestamp => ColumnType::Timestamp,
        };

        Some(match (current, observed) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(ColumnType::Int64), ColumnType::Float64)
            | (Some(ColumnType::Float64), ColumnType::Int64) => ColumnType::Float64,
            _ => ColumnType::Utf8,
        })
    }
}

/// Infer the storage type of `column` from its non-null values.
/// Columns with no non-null values fall back to `Utf8`.
pub fn infer_column_type(column: &str, rows: &[Record]) -> ColumnType {
    rows.iter()
        .filter_map(|row| row.get(column))
        .fold(None, |acc, value| ColumnType::widen(acc, value.kind()))
        .unwrap_or(ColumnType::Utf8)
}

/// Arrow schema for a snapshot, in snapshot column order.
pub fn snapshot_schema(snapshot: &TableSnapshot) -> (SchemaRef, Vec<ColumnType>) {
    let types: Vec<ColumnType> = snapshot
        .columns()
        .iter()
        .map(|column| infer_column_type(column, snapshot.rows()))
        .collect();

    let fields: Vec<Field> = snapshot
        .columns()
        .iter()
        .zip(&types)
        .map(|(name, column_type)| Field::new(name, column_type.data_type(), true))
        .collect();

    let mut metadata = HashMap::new();
    metadata.insert(FORMAT_VERSION_KEY.to_string(), FORMAT_VERSION.to_string());

    (Arc::new(Schema::new(fields).with_metadata(metadata)), types)
}
