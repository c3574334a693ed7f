//! PDF Document module - file structure, object resolution and security.
//!
//! This module contains:
//! - `catalog` - the `Document` (object table owner, caches, edits)
//! - `xref` - cross-reference tables, streams and the `Prev` chain
//! - `repair` - brute-force rebuild of the object table
//! - `objstm` - object streams
//! - `security` - standard security handlers

pub mod catalog;
pub mod objstm;
pub mod repair;
pub mod security;
pub mod xref;

// Re-export main types for convenience
pub use catalog::{DEFAULT_CACHE_CAPACITY, Document, PdfBytes};
pub use objstm::ObjectStream;
pub use security::{
    Aes256SecurityHandler, CryptMethod, PASSWORD_PADDING, SecurityHandler,
    StandardSecurityHandler, create_security_handler,
};
pub use xref::{XrefChain, XrefEntry, XrefSection, XrefTable};
