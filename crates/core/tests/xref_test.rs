//! Cross-reference loading, precedence and brute-force rebuild.

mod common;

use bytes::Bytes;
use common::{CONTENT, find, object_stream_pdf, populate, simple_pdf, xref_stream_pdf};
use quire_core::document::XrefEntry;
use quire_core::{CancelToken, Document, FileWriter, ObjRef, OpenOptions, PdfError, PdfObject};

fn open(bytes: &[u8]) -> Document {
    Document::new(bytes, "").unwrap()
}

fn rfind(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .rposition(|w| w == needle)
        .unwrap()
}

/// The number after the last `startxref`.
fn startxref_of(bytes: &[u8]) -> usize {
    let at = rfind(bytes, b"startxref") + b"startxref".len();
    let digits: String = bytes[at..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    digits.parse().unwrap()
}

/// Replace the final `startxref` value.
fn with_startxref(bytes: &[u8], value: &str) -> Vec<u8> {
    let mut out = bytes[..rfind(bytes, b"startxref")].to_vec();
    out.extend_from_slice(format!("startxref\n{value}\n%%EOF\n").as_bytes());
    out
}

fn title(doc: &Document) -> Vec<u8> {
    let info = doc.info().unwrap().unwrap();
    info.get("Title").unwrap().as_bytes().unwrap().to_vec()
}

#[test]
fn test_classic_table() {
    let doc = open(&simple_pdf());
    assert!(!doc.recovered());
    assert_eq!(doc.version(), Some("1.4"));
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    assert_eq!(doc.xref().object_count(), 5);
    assert_eq!(title(&doc), b"Fixture");
}

#[test]
fn test_xref_stream() {
    let doc = open(&xref_stream_pdf());
    assert!(!doc.recovered());
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    let content = doc.get_object(ObjRef::new(4, 0)).unwrap();
    assert_eq!(doc.decode_stream(content.as_stream().unwrap()).unwrap(), CONTENT);
    // the trailer is the xref stream dictionary
    assert!(doc.trailer().is_type("XRef"));
}

#[test]
fn test_objects_inside_object_streams() {
    let doc = open(&object_stream_pdf());
    assert!(!doc.recovered());
    assert!(matches!(
        doc.xref().get(1),
        Some(XrefEntry::InObjectStream { .. })
    ));
    assert!(matches!(doc.xref().get(4), Some(XrefEntry::InFile { .. })));
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    assert_eq!(title(&doc), b"Fixture");
}

#[test]
fn test_hybrid_file_prefers_xref_stream() {
    let base = object_stream_pdf();
    let stm = startxref_of(&base);
    let at = base.len();
    let mut bytes = base.clone();
    // The classic section claims object 5 is free; the stream says otherwise.
    bytes.extend_from_slice(
        format!(
            "xref\n0 1\n0000000000 65535 f\r\n5 1\n0000000000 00001 f\r\n\
             trailer\n<</Size 8 /Root 1 0 R /Info 5 0 R /XRefStm {stm}>>\n\
             startxref\n{at}\n%%EOF\n"
        )
        .as_bytes(),
    );
    let doc = open(&bytes);
    assert!(!doc.recovered());
    assert!(matches!(
        doc.xref().get(5),
        Some(XrefEntry::InObjectStream { .. })
    ));
    assert_eq!(title(&doc), b"Fixture");
}

#[test]
fn test_missing_references_resolve_to_null() {
    let doc = open(&simple_pdf());
    assert_eq!(*doc.get_object(ObjRef::new(99, 0)).unwrap(), PdfObject::Null);
    // wrong generation
    assert_eq!(*doc.get_object(ObjRef::new(1, 3)).unwrap(), PdfObject::Null);
    assert!(doc.unreadable_objects().is_empty());
}

#[test]
fn test_reference_chains() {
    let mut w = FileWriter::new("1.4");
    let catalog = populate(&mut w);
    let alias = w.add(PdfObject::Reference(catalog));
    let looped = w.reserve();
    w.set(looped, PdfObject::Reference(looped));
    let doc = open(&w.to_bytes().unwrap());

    let resolved = doc.resolve(&PdfObject::Reference(alias)).unwrap();
    assert!(resolved.as_dict().unwrap().is_type("Catalog"));
    assert!(doc.resolve(&PdfObject::Reference(looped)).is_err());
}

#[test]
fn test_bad_startxref_triggers_rebuild() {
    let doc = open(&with_startxref(&simple_pdf(), "0"));
    assert!(doc.recovered());
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    assert_eq!(title(&doc), b"Fixture");
}

#[test]
fn test_rebuild_without_any_xref_data() {
    let bytes = simple_pdf();
    let objects_only = &bytes[..find(&bytes, b"xref\n")];
    let doc = open(objects_only);
    assert!(doc.recovered());
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    // synthesized trailer only knows the catalog
    assert!(doc.info().unwrap().is_none());
}

#[test]
fn test_rebuild_finds_objects_in_object_streams() {
    let doc = open(&with_startxref(&object_stream_pdf(), "12"));
    assert!(doc.recovered());
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    assert_eq!(title(&doc), b"Fixture");
    assert!(!doc.trailer().contains_key("W"));
}

#[test]
fn test_rebuild_keeps_last_definition() {
    let bytes = simple_pdf();
    let mut patched = bytes[..rfind(&bytes, b"startxref")].to_vec();
    patched.extend_from_slice(b"5 0 obj\n<</Title (Later)>>\nendobj\n");
    let doc = open(&patched);
    assert!(doc.recovered());
    assert_eq!(title(&doc), b"Later");
}

#[test]
fn test_prev_loop_is_detected() {
    let bytes = simple_pdf();
    let startxref = startxref_of(&bytes);
    let at = find(&bytes, b"trailer\n<<") + b"trailer\n<<".len();
    let mut patched = bytes[..at].to_vec();
    patched.extend_from_slice(format!("/Prev {startxref} ").as_bytes());
    patched.extend_from_slice(&bytes[at..]);
    let doc = open(&patched);
    assert!(doc.recovered());
    assert!(doc.catalog().is_ok());
}

#[test]
fn test_leading_garbage_shifts_offsets() {
    let mut bytes = b"JUNK BYTES\n".to_vec();
    bytes.extend_from_slice(&simple_pdf());
    let doc = open(&bytes);
    assert_eq!(doc.header_offset(), 11);
    assert!(!doc.recovered());
    assert_eq!(title(&doc), b"Fixture");
}

#[test]
fn test_incremental_update_wins() {
    let mut doc = open(&simple_pdf());
    let mut info = doc.info().unwrap().unwrap();
    info.insert("Title", PdfObject::string(b"Second".to_vec()));
    doc.set_object(ObjRef::new(5, 0), info);
    let mut out = Vec::new();
    doc.save_incremental(&mut out).unwrap();

    let updated = open(&out);
    assert!(!updated.recovered());
    assert_eq!(updated.trailers().len(), 2);
    assert_eq!(title(&updated), b"Second");

    // too few sections allowed: fall back to a rebuild, which still sees
    // the later definition
    let options = OpenOptions::default().max_xref_sections(1);
    let capped = Document::from_bytes(Bytes::from(out), &options).unwrap();
    assert!(capped.recovered());
    assert_eq!(title(&capped), b"Second");
}

#[test]
fn test_cancelled_open() {
    let token = CancelToken::new();
    token.cancel();
    let options = OpenOptions::default().cancel_token(token);
    let result = Document::from_bytes(Bytes::from(simple_pdf()), &options);
    assert!(matches!(result, Err(PdfError::Cancelled)));
}

#[test]
fn test_open_from_file_is_mapped() {
    let file = common::write_temp(&simple_pdf());
    let doc = Document::open(file.path(), &OpenOptions::default()).unwrap();
    assert!(doc.is_mapped());
    assert!(doc.catalog().unwrap().is_type("Catalog"));
    doc.close();
}

#[test]
fn test_unparseable_file_is_unreadable() {
    let result = Document::new(b"%PDF-1.4\nnothing useful here\n", "");
    assert!(matches!(result, Err(PdfError::DocumentUnreadable(_))));
}
