use crate::domains::archive::schemas::inference::TIMESTAMP_TZ;
use crate::domains::archive::schemas::{snapshot_schema, ColumnType};
use crate::domains::archive::types::{ArchiveConfig, ParquetCompression, TableSnapshot};
use crate::types::{Record, Value};
use arrow::array::*;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};

/// Encode a snapshot as a complete Parquet file held in memory.
pub fn encode_snapshot(snapshot: &TableSnapshot, config: &ArchiveConfig) -> Result<Vec<u8>, ParquetError> {
    let (schema, types) = snapshot_schema(snapshot);
    let batch_size = config.row_group_size.max(1);

    let mut writer = ArrowWriter::try_new(Vec::new(), schema.clone(), Some(writer_properties(config)))?;
    let mut builder = RecordBatchBuilder::new(schema, types);

    for chunk in snapshot.rows().chunks(batch_size) {
        for row in chunk {
            builder.append_row(row);
        }
        writer.write(&builder.finish()?)?;
    }

    writer.into_inner()
}

fn writer_properties(config: &ArchiveConfig) -> WriterProperties {
    let statistics = if config.enable_statistics {
        EnabledStatistics::Chunk
    } else {
        EnabledStatistics::None
    };

    WriterProperties::builder()
        .set_compression(compression(config.compression))
        .set_max_row_group_size(config.row_group_size.max(1))
        .set_statistics_enabled(statistics)
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_created_by(format!("table_archive {}", env!("CARGO_PKG_VERSION")))
        .build()
}

fn compression(codec: ParquetCompression) -> Compression {
    match codec {
        ParquetCompression::None => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Lz4 => Compression::LZ4_RAW,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Brotli => Compression::BROTLI(BrotliLevel::default()),
    }
}

/// Record batch builder for accumulating rows
pub struct RecordBatchBuilder {
    schema: SchemaRef,
    types: Vec<ColumnType>,
    builders: Vec<Box<dyn ArrayBuilder>>,
}

impl RecordBatchBuilder {
    pub fn new(schema: SchemaRef, types: Vec<ColumnType>) -> Self {
        let builders = types.iter().map(|t| Self::create_builder(*t)).collect();
        Self { schema, types, builders }
    }

    fn create_builder(column_type: ColumnType) -> Box<dyn ArrayBuilder> {
        match column_type {
            ColumnType::Boolean => Box::new(BooleanBuilder::new()),
            ColumnType::Int64 => Box::new(Int64Builder::new()),
            ColumnType::Float64 => Box::new(Float64Builder::new()),
            ColumnType::Utf8 => Box::new(StringBuilder::new()),
            ColumnType::Binary => Box::new(BinaryBuilder::new()),
            ColumnType::Timestamp => Box::new(TimestampMicrosecondBuilder::new().with_timezone(TIMESTAMP_TZ)),
        }
    }

    /// Append one row. Missing or mismatched cells become nulls; the column
    /// type was inferred from the same rows, so that only happens for nulls.
    pub fn append_row(&mut self, row: &Record) {
        for (index, field) in self.schema.fields().iter().enumerate() {
            let value = row.get(field.name()).unwrap_or(&Value::Null);
            let builder = self.builders[index].as_any_mut();

            match self.types[index] {
                ColumnType::Boolean => {
                    if let Some(b) = builder.downcast_mut::<BooleanBuilder>() {
                        b.append_option(value.as_bool());
                    }
                }
                ColumnType::Int64 => {
                    if let Some(b) = builder.downcast_mut::<Int64Builder>() {
                        b.append_option(value.as_i64());
                    }
                }
                ColumnType::Float64 => {
                    if let Some(b) = builder.downcast_mut::<Float64Builder>() {
                        b.append_option(value.as_f64());
                    }
                }
                ColumnType::Utf8 => {
                    if let Some(b) = builder.downcast_mut::<StringBuilder>() {
                        match value {
                            Value::Null => b.append_null(),
                            Value::Text(s) => b.append_value(s),
                            other => b.append_value(other.to_string()),
                        }
                    }
                }
                ColumnType::Binary => {
                    if let Some(b) = builder.downcast_mut::<BinaryBuilder>() {
                        match value {
                            Value::Bytes(bytes) => b.append_value(bytes),
                            _ => b.append_null(),
                        }
                    }
                }
                ColumnType::Timestamp => {
                    if let Some(b) = builder.downcast_mut::<TimestampMicrosecondBuilder>() {
                        match value {
                            Value::Timestamp(ts) => b.append_value(ts.timestamp_micros()),
                            _ => b.append_null(),
                        }
                    }
                }
            }
        }
    }

    /// Drain the builders into a batch; the builders are ready for reuse afterwards.
    pub fn finish(&mut self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(|builder| builder.finish()).collect();
        RecordBatch::try_new(self.schema.clone(), arrays)
    }
}
