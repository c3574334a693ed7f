//! Options and batch inspection.
//!
//! # Example
//!
//! ```ignore
//! use quire_core::api::{BatchOptions, inspect_files};
//!
//! let results = inspect_files(&["a.pdf", "b.pdf"], &BatchOptions::default())?;
//! for (path, summary) in results {
//!     println!("{}: {:?}", path.display(), summary.map(|s| s.objects));
//! }
//! ```

pub mod batch;
pub mod options;

pub use batch::{DocumentSummary, inspect, inspect_document, inspect_files};
pub use options::{BatchOptions, CancelToken, DEFAULT_MAX_DECODED_BYTES, OpenOptions};
