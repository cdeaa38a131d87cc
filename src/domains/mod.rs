pub mod archive;
pub mod table;
