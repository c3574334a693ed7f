//! quire - PDF object model, cross-reference resolver, stream filters,
//! standard-security decryption and incremental writer.
//!
//! # Example
//!
//! ```ignore
//! use quire_core::{Document, OpenOptions, ObjRef};
//!
//! let doc = Document::open("file.pdf", &OpenOptions::default())?;
//! let catalog = doc.catalog()?;
//! let first = doc.get_object(ObjRef::new(1, 0))?;
//! ```

pub mod api;
pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod utils;
pub mod writer;

// Re-export codec modules for convenience
pub use codec::aes;
pub use codec::arcfour;
pub use codec::ascii85;
pub use codec::lzw;
pub use codec::runlength;

pub use api::{BatchOptions, CancelToken, DocumentSummary, OpenOptions, inspect_files};
pub use document::{Document, PdfBytes};
pub use error::{PdfError, Result};
pub use model::{Dictionary, Name, ObjRef, PdfNumber, PdfObject, PdfStream, PdfString, StringFormat};
pub use writer::FileWriter;
