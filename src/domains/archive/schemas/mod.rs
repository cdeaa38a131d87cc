pub mod inference;

pub use inference::{infer_column_type, snapshot_schema, ColumnType};
