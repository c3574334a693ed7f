//! Parallel batch inspection.

mod common;

use common::{object_stream_pdf, simple_pdf, write_temp, xref_stream_pdf};
use quire_core::api::inspect;
use quire_core::{BatchOptions, OpenOptions, PdfError, inspect_files};

#[test]
fn test_inspect_single_file() {
    let file = write_temp(&object_stream_pdf());
    let summary = inspect(file.path(), &OpenOptions::default()).unwrap();
    assert_eq!(summary.version.as_deref(), Some("1.5"));
    assert!(!summary.recovered);
    assert!(!summary.encrypted);
    // 5 fixture objects, the object stream and the xref stream
    assert_eq!(summary.objects, 7);
    assert_eq!(summary.streams, 3);
    assert!(summary.is_clean());
}

#[test]
fn test_batch_keeps_input_order_and_isolates_failures() {
    let files = [
        write_temp(&simple_pdf()),
        write_temp(b"not a pdf at all"),
        write_temp(&xref_stream_pdf()),
    ];
    let paths: Vec<_> = files.iter().map(|f| f.path().to_path_buf()).collect();
    let options = BatchOptions {
        threads: Some(3),
        ..BatchOptions::default()
    };

    let results = inspect_files(&paths, &options).unwrap();
    assert_eq!(results.len(), 3);
    for (i, (path, _)) in results.iter().enumerate() {
        assert_eq!(path, &paths[i]);
    }
    assert_eq!(results[0].1.as_ref().unwrap().objects, 5);
    assert!(matches!(results[1].1, Err(PdfError::DocumentUnreadable(_))));
    assert!(results[2].1.as_ref().unwrap().is_clean());
}

#[test]
fn test_undecodable_stream_is_reported() {
    let mut bytes = simple_pdf();
    // Corrupt the compressed content stream of object 4 in place.
    let start = common::find(&bytes, b"stream\n") + b"stream\n".len();
    for b in &mut bytes[start..start + 4] {
        *b = b'!';
    }
    let file = write_temp(&bytes);
    let summary = inspect(file.path(), &OpenOptions::default()).unwrap();
    assert_eq!(summary.undecodable_streams.len(), 1);
    assert!(!summary.is_clean());
}
