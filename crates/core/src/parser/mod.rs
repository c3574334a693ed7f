//! PDF parsing modules.
//!
//! - `lexer`: byte-level tokenizer
//! - `pdf_parser`: object parser and indirect-object reader

pub mod lexer;
pub mod pdf_parser;

// Re-export main types for convenience
pub use lexer::{Keyword, Lexer, Token};
pub use pdf_parser::{NoLocator, ObjectLocator, ObjectParser, parse_indirect_object};
