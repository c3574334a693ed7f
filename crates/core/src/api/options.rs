//! Options for opening documents and batch inspection.
//!
//! # Example
//! ```ignore
//! use quire_core::api::OpenOptions;
//!
//! let options = OpenOptions::default()
//!     .password("secret")
//!     .cache_capacity(256);
//! ```

use crate::error::{PdfError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Default for [`OpenOptions::max_decoded_bytes`]: 256 MiB.
pub const DEFAULT_MAX_DECODED_BYTES: usize = 256 << 20;

/// Options for [`Document::open`](crate::document::Document::open) and
/// friends.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Password for encrypted documents. `None` tries the empty user password.
    pub password: Option<String>,

    /// Number of resolved objects kept in the LRU cache.
    pub cache_capacity: usize,

    /// How many bytes before EOF to search for `startxref`.
    pub startxref_window: usize,

    /// Cap on the bytes scanned by a brute-force rebuild. `None` scans the whole file.
    pub max_rebuild_bytes: Option<usize>,

    /// Cap on the number of sections followed through `Prev`.
    pub max_xref_sections: usize,

    /// Maximum array/dictionary nesting depth.
    pub max_nesting: usize,

    /// Cap on the output of each decompressing filter stage.
    pub max_decoded_bytes: usize,

    pub cancel: Option<CancelToken>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            password: None,
            cache_capacity: 1024,
            startxref_window: 1024,
            max_rebuild_bytes: None,
            max_xref_sections: 4096,
            max_nesting: 256,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            cancel: None,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub const fn startxref_window(mut self, window: usize) -> Self {
        self.startxref_window = window;
        self
    }

    pub const fn max_rebuild_bytes(mut self, max: Option<usize>) -> Self {
        self.max_rebuild_bytes = max;
        self
    }

    pub const fn max_xref_sections(mut self, max: usize) -> Self {
        self.max_xref_sections = max;
        self
    }

    pub const fn max_nesting(mut self, max: usize) -> Self {
        self.max_nesting = max;
        self
    }

    pub const fn max_decoded_bytes(mut self, max: usize) -> Self {
        self.max_decoded_bytes = max;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(PdfError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Options for [`inspect_files`](super::batch::inspect_files).
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub open: OpenOptions,
    /// Worker threads; `None` uses the number of CPUs.
    pub threads: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = OpenOptions::default();
        assert_eq!(options.cache_capacity, 1024);
        assert_eq!(options.startxref_window, 1024);
        assert_eq!(options.max_xref_sections, 4096);
        assert_eq!(options.max_nesting, 256);
        assert_eq!(options.max_decoded_bytes, DEFAULT_MAX_DECODED_BYTES);
        assert!(options.password.is_none());
    }

    #[test]
    fn cancellation_is_shared() {
        let token = CancelToken::new();
        let options = OpenOptions::default().cancel_token(token.clone());
        assert!(options.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(options.check_cancelled(), Err(PdfError::Cancelled)));
    }
}
