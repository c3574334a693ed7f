//! Serialization back to PDF syntax.
//!
//! - `serialize` - canonical syntax for single objects
//! - `incremental` - appending a revision to an opened [`Document`](crate::document::Document)
//! - `file` - [`FileWriter`], whole files from scratch

pub mod file;
pub mod incremental;
pub mod serialize;

pub use file::FileWriter;
pub use incremental::write_revision;
pub use serialize::{to_bytes, write_indirect, write_object};
