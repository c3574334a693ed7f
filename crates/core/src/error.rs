//! Error types for the quire PDF core.

use crate::codec::filters::FilterError;
use crate::model::objects::ObjRef;
use thiserror::Error;

/// Primary error type for PDF parsing, decoding and writing.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    Lex { pos: usize, msg: String },

    #[error("parse error at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("cross-reference data is corrupt: {0}")]
    XrefCorrupt(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("incorrect password")]
    AuthenticationFailure,

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("dangling reference {0}")]
    DanglingReference(ObjRef),

    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the error is a syntax-level failure that a rescan may recover from.
    pub const fn is_syntax(&self) -> bool {
        matches!(
            self,
            Self::Lex { .. } | Self::Parse { .. } | Self::UnexpectedEof | Self::TypeError { .. }
        )
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
