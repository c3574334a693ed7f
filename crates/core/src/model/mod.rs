//! PDF model types.
//!
//! - `objects` - PDF object types (PdfObject, PdfStream, ObjRef, Dictionary)

pub mod objects;

// Re-export main types for convenience
pub use objects::{Dictionary, Name, ObjRef, PdfNumber, PdfObject, PdfStream, PdfString, StringFormat};
