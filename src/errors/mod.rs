mod error;

pub use error::{ArchiveError, TableError};

/// Result type for table source operations
pub type TableResult<T> = Result<T, TableError>;

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
