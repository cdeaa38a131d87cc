pub mod parquet_reader;

pub use parquet_reader::{decode_snapshot, DecodeError};
