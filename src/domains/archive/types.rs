use crate::domains::table::{InsertOptions, TableSource};
use crate::errors::{ArchiveError, ArchiveResult, TableResult};
use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;

/// Parquet compression options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParquetCompression {
    None,
    Snappy,
    Gzip,
    Lz4,
    Zstd,
    Brotli,
}

impl ParquetCompression {
    /// Parse the names accepted by `TABLE_ARCHIVE_COMPRESSION`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Some(Self::None),
            "snappy" => Some(Self::Snappy),
            "gzip" => Some(Self::Gzip),
            "lz4" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            "brotli" => Some(Self::Brotli),
            _ => None,
        }
    }
}

const COMPRESSION_VAR: &str = "TABLE_ARCHIVE_COMPRESSION";
const ROW_GROUP_SIZE_VAR: &str = "TABLE_ARCHIVE_ROW_GROUP_SIZE";

/// Settings applied when writing table entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveConfig {
    pub compression: ParquetCompression,
    pub row_group_size: usize,
    pub enable_statistics: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::Snappy,
            row_group_size: 10_000,
            enable_statistics: true,
        }
    }
}

impl ArchiveConfig {
    /// Defaults overridden by `TABLE_ARCHIVE_COMPRESSION` and
    /// `TABLE_ARCHIVE_ROW_GROUP_SIZE`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(compression) = lookup(COMPRESSION_VAR).and_then(|val| ParquetCompression::parse(&val)) {
            config.compression = compression;
        }

        if let Some(size) = lookup(ROW_GROUP_SIZE_VAR)
            .and_then(|val| val.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
        {
            config.row_group_size = size;
        }

        config
    }
}

/// Ordered column list plus rows, all rows sharing that column set
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl TableSnapshot {
    /// Infer the column set from the first row. Zero rows carry no column
    /// information, so they are rejected here; use [`TableSnapshot::with_columns`].
    pub fn from_records(records: Vec<Record>) -> ArchiveResult<Self> {
        let columns: Vec<String> = records
            .first()
            .ok_or(ArchiveError::MissingColumns)?
            .keys()
            .cloned()
            .collect();
        Self::with_columns(columns, records)
    }

    pub fn with_columns(columns: Vec<String>, records: Vec<Record>) -> ArchiveResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ArchiveError::DuplicateColumn(column.clone()));
            }
        }

        for (row, record) in records.iter().enumerate() {
            let consistent = record.len() == columns.len()
                && record.keys().all(|key| seen.contains(key.as_str()));
            if !consistent {
                return Err(ArchiveError::InconsistentColumns {
                    row,
                    expected: columns.clone(),
                    found: record.keys().cloned().collect(),
                });
            }
        }

        Ok(Self { columns, rows: records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.rows
    }
}

/// Records decoded from an archive, with the caller's insertion options
/// carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub table: String,
    pub records: Vec<Record>,
    pub insert_options: InsertOptions,
}

impl LoadedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Hand the records to `target.insert` with the stored options.
    pub async fn insert_into<S>(&self, target: &S) -> TableResult<usize>
    where
        S: TableSource + ?Sized,
    {
        target.insert(&self.records, &self.insert_options).await?;
        Ok(self.records.len())
    }
}
