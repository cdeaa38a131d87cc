use crate::domains::archive::store::ArchiveStore;
use crate::domains::archive::types::{LoadedTable, TableSnapshot};
use crate::domains::table::{InsertOptions, TableSource};
use crate::errors::{ArchiveError, ArchiveResult};
use async_trait::async_trait;
use std::path::Path;
use tokio::task;

/// Archive save/load for every table source
#[async_trait]
pub trait TableArchive: TableSource {
    /// Current rows as a snapshot. An empty table takes its columns from
    /// [`TableSource::columns`].
    async fn snapshot(&self) -> ArchiveResult<TableSnapshot> {
        let records = self.fetch().await?;
        if records.is_empty() {
            let columns = self.columns().await?;
            return TableSnapshot::with_columns(columns, records);
        }
        TableSnapshot::from_records(records)
    }

    /// Save the table's contents to the archive at `path` under [`TableSource::name`].
    /// Returns the number of rows written.
    async fn save_to_archive(&self, path: &Path) -> ArchiveResult<usize> {
        self.save_to_store(&ArchiveStore::new(path)).await
    }

    async fn save_to_store(&self, store: &ArchiveStore) -> ArchiveResult<usize> {
        let snapshot = self.snapshot().await?;
        let rows = snapshot.num_rows();
        let table = self.name().to_string();
        let store = store.clone();

        task::spawn_blocking(move || store.save(&table, &snapshot))
            .await
            .map_err(|e| ArchiveError::Internal(format!("Task join error: {}", e)))??;
        Ok(rows)
    }

    /// Read this table's entry from the archive at `path` and insert it with
    /// `options`. Returns the number of records handed to `insert`.
    async fn load_from_archive(&self, path: &Path, options: InsertOptions) -> ArchiveResult<usize> {
        self.load_from_store(&ArchiveStore::new(path), options).await
    }

    async fn load_from_store(&self, store: &ArchiveStore, options: InsertOptions) -> ArchiveResult<usize> {
        let table = self.name().to_string();
        let reader = store.clone();
        let lookup = table.clone();

        let snapshot = task::spawn_blocking(move || reader.load(&lookup))
            .await
            .map_err(|e| ArchiveError::Internal(format!("Task join error: {}", e)))??;

        let loaded = LoadedTable {
            table,
            records: snapshot.into_records(),
            insert_options: options,
        };
        log::info!("Inserting {} records into {}", loaded.len(), loaded.table);
        Ok(loaded.insert_into(self).await?)
    }
}

impl<T: TableSource + ?Sized> TableArchive for T {}
