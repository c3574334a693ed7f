//! Parallel inspection of many files.
//!
//! Each file is opened, every in-use object is loaded and every stream is
//! run through its filter chain. Files are independent, so they are spread
//! over a rayon pool; a failure in one file never affects another.

use super::options::{BatchOptions, OpenOptions};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::model::objects::{ObjRef, PdfObject};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// What [`inspect`] learned about one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentSummary {
    /// Version from the `%PDF-` header.
    pub version: Option<String>,
    /// In-use entries in the cross-reference table.
    pub xref_entries: usize,
    /// Objects that loaded.
    pub objects: usize,
    pub streams: usize,
    /// The table was rebuilt by scanning the file.
    pub recovered: bool,
    pub encrypted: bool,
    /// Why objects could not be decrypted, if so.
    pub security_error: Option<String>,
    pub unreadable: Vec<ObjRef>,
    /// Streams whose filter chain failed.
    pub undecodable_streams: Vec<ObjRef>,
}

impl DocumentSummary {
    /// No unreadable objects, no undecodable streams, no security error.
    pub fn is_clean(&self) -> bool {
        self.unreadable.is_empty() && self.undecodable_streams.is_empty() && self.security_error.is_none()
    }
}

pub(crate) fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Open `path` and load everything in it.
pub fn inspect(path: impl AsRef<Path>, options: &OpenOptions) -> Result<DocumentSummary> {
    let doc = Document::open(path, options)?;
    inspect_document(&doc, options)
}

/// Load every in-use object of an opened document.
pub fn inspect_document(doc: &Document, options: &OpenOptions) -> Result<DocumentSummary> {
    let mut summary = DocumentSummary {
        version: doc.version().map(str::to_string),
        xref_entries: doc.xref().object_count(),
        recovered: doc.recovered(),
        encrypted: doc.is_encrypted(),
        security_error: doc.security_error().map(|e| e.to_string()),
        ..DocumentSummary::default()
    };
    if summary.security_error.is_some() {
        return Ok(summary);
    }

    for (number, entry) in doc.xref().iter() {
        if number == 0 || entry.is_free() {
            continue;
        }
        options.check_cancelled()?;
        let reference = ObjRef::new(number, entry.generation());
        let obj = match doc.get_object(reference) {
            Ok(obj) => obj,
            Err(PdfError::Cancelled) => return Err(PdfError::Cancelled),
            Err(err) => {
                tracing::debug!(%reference, error = %err, "object failed to load");
                continue;
            }
        };
        summary.objects += 1;
        if let PdfObject::Stream(stream) = obj.as_ref() {
            summary.streams += 1;
            if let Err(err) = doc.decode_stream(stream) {
                tracing::debug!(%reference, error = %err, "stream failed to decode");
                summary.undecodable_streams.push(reference);
            }
        }
    }
    summary.unreadable = doc.unreadable_objects();
    Ok(summary)
}

/// Inspect `paths` on a rayon pool. Results come back in input order.
pub fn inspect_files<P>(paths: &[P], options: &BatchOptions) -> Result<Vec<(PathBuf, Result<DocumentSummary>)>>
where
    P: AsRef<Path> + Sync,
{
    let threads = options.threads.unwrap_or_else(default_thread_count).max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| PdfError::Io(std::io::Error::other(e)))?;

    let mut results: Vec<(usize, PathBuf, Result<DocumentSummary>)> = pool.install(|| {
        paths
            .par_iter()
            .enumerate()
            .map(|(idx, path)| {
                let path = path.as_ref().to_path_buf();
                let summary = inspect(&path, &options.open);
                if let Err(err) = &summary {
                    tracing::warn!(path = %path.display(), error = %err, "inspection failed");
                }
                (idx, path, summary)
            })
            .collect()
    });

    results.sort_by_key(|(idx, _, _)| *idx);
    Ok(results
        .into_iter()
        .map(|(_, path, summary)| (path, summary))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_summary() {
        assert!(DocumentSummary::default().is_clean());
        let summary = DocumentSummary {
            undecodable_streams: vec![ObjRef::new(3, 0)],
            ..DocumentSummary::default()
        };
        assert!(!summary.is_clean());
    }

    #[test]
    fn missing_files_fail_individually() {
        let paths = ["/nonexistent/a.pdf", "/nonexistent/b.pdf"];
        let options = BatchOptions {
            threads: Some(2),
            ..BatchOptions::default()
        };
        let results = inspect_files(&paths, &options).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, PathBuf::from("/nonexistent/a.pdf"));
        assert!(matches!(results[1].1, Err(PdfError::Io(_))));
    }
}
