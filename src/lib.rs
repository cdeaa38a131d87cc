//! Save database tables into a single archive file and load them back.
//!
//! An archive holds one Parquet entry per table inside a ZIP container.
//! Tables are saved through the [`TableArchive`] extension, which every
//! [`TableSource`] gets for free, or in bulk through an [`ExportRegistry`].

pub mod domains;
pub mod errors;
pub mod types;

pub use domains::archive::{
    load, load_snapshot, save, save_snapshot, ArchiveConfig, ArchiveStore, ExportRegistry, ExportSummary,
    LoadedTable, ParquetCompression, TableArchive, TableExport, TableSnapshot,
};
pub use domains::table::{InsertOptions, SqliteTable, TableSource};
pub use errors::{ArchiveError, ArchiveResult, TableError, TableResult};
pub use types::{Record, Value};

/// Set up `env_logger`, defaulting `RUST_LOG` to `debug` in debug builds and
/// `info` otherwise. Safe to call more than once.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        #[cfg(debug_assertions)]
        std::env::set_var("RUST_LOG", "debug");
        #[cfg(not(debug_assertions))]
        std::env::set_var("RUST_LOG", "info");
    }

    let _ = env_logger::try_init();
}
