pub mod export;
pub mod readers;
pub mod schemas;
pub mod service;
pub mod store;
pub mod types;
pub mod writers;

pub use export::{ExportRegistry, ExportSummary, TableExport};
pub use service::TableArchive;
pub use store::{validate_identifier, ArchiveStore};
pub use types::{ArchiveConfig, LoadedTable, ParquetCompression, TableSnapshot};

use crate::domains::table::InsertOptions;
use crate::errors::ArchiveResult;
use crate::types::Record;
use std::path::Path;

/// Save `records` as `table_identifier` in the archive at `destination`.
///
/// The column set is taken from the rows, so an empty slice fails with
/// `MissingColumns`; use [`save_snapshot`] with explicit columns for that case.
pub fn save(records: &[Record], table_identifier: &str, destination: impl AsRef<Path>) -> ArchiveResult<()> {
    let snapshot = TableSnapshot::from_records(records.to_vec())?;
    save_snapshot(&snapshot, table_identifier, destination)
}

pub fn save_snapshot(
    snapshot: &TableSnapshot,
    table_identifier: &str,
    destination: impl AsRef<Path>,
) -> ArchiveResult<()> {
    ArchiveStore::new(destination.as_ref()).save(table_identifier, snapshot)
}

/// Load `table_identifier` from the archive at `source`. `insert_options` is
/// not interpreted; it travels with the records to the eventual insert.
pub fn load(
    table_identifier: &str,
    source: impl AsRef<Path>,
    insert_options: InsertOptions,
) -> ArchiveResult<LoadedTable> {
    let snapshot = load_snapshot(table_identifier, source)?;
    Ok(LoadedTable {
        table: table_identifier.to_string(),
        records: snapshot.into_records(),
        insert_options,
    })
}

pub fn load_snapshot(table_identifier: &str, source: impl AsRef<Path>) -> ArchiveResult<TableSnapshot> {
    ArchiveStore::new(source.as_ref()).load(table_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ArchiveError;
    use crate::record;
    use crate::types::Value;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_preserves_rows_and_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        let records = vec![
            record! { "id" => 3, "name" => "c", "weight" => 0.5 },
            record! { "id" => 1, "name" => "a", "weight" => Value::Null },
            record! { "id" => 2, "name" => Value::Null, "weight" => 2.0 },
        ];

        save(&records, "Things", &path).unwrap();
        let loaded = load("Things", &path, InsertOptions::default()).unwrap();
        assert_eq!(loaded.table, "Things");
        assert_eq!(loaded.records, records);
    }

    #[test]
    fn test_documented_coercions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::nanoseconds(1_500);
        let records = vec![
            record! { "mixed_num" => 1, "mixed_any" => 1, "t" => ts },
            record! { "mixed_num" => 2.5, "mixed_any" => "x", "t" => Value::Null },
        ];

        save(&records, "T", &path).unwrap();
        let loaded = load("T", &path, InsertOptions::default()).unwrap().into_records();

        assert_eq!(loaded[0]["mixed_num"], Value::Float(1.0));
        assert_eq!(loaded[1]["mixed_num"], Value::Float(2.5));
        assert_eq!(loaded[0]["mixed_any"], Value::from("1"));
        assert_eq!(loaded[1]["mixed_any"], Value::from("x"));
        // truncated to microseconds
        assert_eq!(
            loaded[0]["t"],
            Value::Timestamp(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::microseconds(1))
        );
        assert_eq!(loaded[1]["t"], Value::Null);
    }

    #[test]
    fn test_isolation_between_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        let a = vec![record! { "x" => 1 }, record! { "x" => 2 }];
        save(&a, "A", &path).unwrap();
        let before = load("A", &path, InsertOptions::default()).unwrap();

        save(&[record! { "y" => "other" }], "B", &path).unwrap();
        let after = load("A", &path, InsertOptions::default()).unwrap();
        assert_eq!(before, after);
        assert_eq!(after.records, a);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        save(&[record! { "x" => 1 }], "A", &path).unwrap();

        let first = load("A", &path, InsertOptions::default()).unwrap();
        let second = load("A", &path, InsertOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        save(&[record! { "x" => 1 }], "A", &path).unwrap();

        assert!(matches!(
            load("nonexistent", &path, InsertOptions::default()),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(matches!(
            load("A", "/path/does/not/exist", InsertOptions::default()),
            Err(ArchiveError::ReadFailure { .. })
        ));
    }

    #[test]
    fn test_empty_records_need_snapshot_with_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");

        assert!(matches!(save(&[], "Empty", &path), Err(ArchiveError::MissingColumns)));
        assert!(!path.exists());

        let snapshot = TableSnapshot::with_columns(vec!["id".into(), "value".into()], Vec::new()).unwrap();
        save_snapshot(&snapshot, "Empty", &path).unwrap();
        let loaded = load_snapshot("Empty", &path).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.columns(), ["id".to_string(), "value".to_string()]);
    }

    #[test]
    fn test_options_pass_through_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.store");
        save(&[record! { "x" => 1 }], "A", &path).unwrap();

        let options = InsertOptions::new().skip_duplicates(true).ignore_extra_fields(true);
        let loaded = load("A", &path, options).unwrap();
        assert_eq!(loaded.insert_options, options);
    }
}
