use crate::domains::archive::service::TableArchive;
use crate::domains::archive::store::{validate_identifier, ArchiveStore};
use crate::domains::table::TableSource;
use crate::errors::{ArchiveError, ArchiveResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rows written for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExport {
    pub table: String,
    pub rows: usize,
}

/// Result of a bulk export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub destination: PathBuf,
    pub tables: Vec<TableExport>,
}

impl ExportSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Explicit list of table sources to export together
#[derive(Clone, Default)]
pub struct ExportRegistry {
    sources: Vec<Arc<dyn TableSource>>,
}

impl std::fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Names must be valid identifiers and unique within the
    /// registry, since they share one destination.
    pub fn register(&mut self, source: Arc<dyn TableSource>) -> ArchiveResult<&mut Self> {
        let name = source.name();
        validate_identifier(name)?;
        if self.sources.iter().any(|s| s.name() == name) {
            return Err(ArchiveError::DuplicateTable(name.to_string()));
        }
        self.sources.push(source);
        Ok(self)
    }

    pub fn with(mut self, source: Arc<dyn TableSource>) -> ArchiveResult<Self> {
        self.register(source)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch and save every registered source into `destination`, in
    /// registration order. Stops at the first failure; tables saved before
    /// it stay in the archive.
    pub async fn export_all(&self, destination: impl AsRef<Path>) -> ArchiveResult<ExportSummary> {
        self.export_to_store(&ArchiveStore::new(destination.as_ref())).await
    }

    pub async fn export_to_store(&self, store: &ArchiveStore) -> ArchiveResult<ExportSummary> {
        let mut tables = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            log::info!("Saving {}", source.name());
            let rows = source.save_to_store(store).await?;
            tables.push(TableExport {
                table: source.name().to_string(),
                rows,
            });
        }

        log::info!(
            "Exported {} tables to {}",
            tables.len(),
            store.path().display()
        );
        Ok(ExportSummary {
            destination: store.path().to_path_buf(),
            tables,
        })
    }
}
