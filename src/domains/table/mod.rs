pub mod repository;
pub mod types;

pub use repository::{ColumnInfo, SqliteTable, TableSource};
pub use types::InsertOptions;
