//! Incremental revisions and whole-file writing.

mod common;

use common::{dict, name, object_stream_pdf, simple_pdf};
use quire_core::document::XrefEntry;
use quire_core::writer::to_bytes;
use quire_core::{Document, FileWriter, ObjRef, PdfObject, PdfString};

fn open(bytes: &[u8]) -> Document {
    Document::new(bytes, "").unwrap()
}

/// Catalog 1 and an empty page tree 2, classic table.
fn tiny_pdf() -> Vec<u8> {
    let mut w = FileWriter::new("1.4");
    let catalog = w.reserve();
    let pages = w.reserve();
    w.set(
        pages,
        dict(&[
            ("Type", name("Pages")),
            ("Kids", PdfObject::Array(Vec::new())),
            ("Count", PdfObject::integer(0)),
        ]),
    );
    w.set(
        catalog,
        dict(&[("Type", name("Catalog")), ("Pages", pages.into())]),
    );
    w.set_root(catalog);
    w.to_bytes().unwrap()
}

fn save(doc: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_incremental(&mut out).unwrap();
    out
}

#[test]
fn test_revision_layout() {
    let original = tiny_pdf();
    assert_eq!(original.len(), 233);
    let mut doc = open(&original);

    let mut pages = doc.get_object(ObjRef::new(2, 0)).unwrap().as_dict().unwrap().clone();
    pages.insert("Note", PdfObject::string(b"edited".to_vec()));
    doc.set_object(ObjRef::new(2, 0), pages);
    let producer = doc.add_object(dict(&[("Producer", PdfObject::string(b"quire".to_vec()))]));
    assert_eq!(producer, ObjRef::new(3, 0));
    doc.set_trailer_entry("Info", producer);
    assert!(doc.is_dirty());

    let mut out = Vec::new();
    let startxref = doc.save_incremental(&mut out).unwrap();
    assert_eq!(startxref, 335);
    assert!(out.starts_with(&original));

    let revision = String::from_utf8(out[original.len()..].to_vec())
        .unwrap()
        .replace("\r\n", "\n");
    insta::assert_snapshot!(revision.trim_end(), @r"
2 0 obj
<</Type /Pages /Kids [] /Count 0 /Note (edited)>>
endobj
3 0 obj
<</Producer (quire)>>
endobj
xref
0 1
0000000000 65535 f
2 2
0000000233 00000 n
0000000298 00000 n
trailer
<</Root 1 0 R /Size 4 /Info 3 0 R /Prev 112>>
startxref
335
%%EOF
");
}

#[test]
fn test_revision_reopens_with_edits() {
    let mut doc = open(&simple_pdf());
    doc.set_object(
        ObjRef::new(5, 0),
        dict(&[("Title", PdfObject::String(PdfString::from_text("\u{4e2d}\u{6587}")))]),
    );
    let out = save(&doc);

    let reopened = open(&out);
    assert!(!reopened.recovered());
    let info = reopened.info().unwrap().unwrap();
    assert_eq!(info.get("Title").unwrap().as_string().unwrap().to_text(), "\u{4e2d}\u{6587}");
    // untouched objects still come from the first revision
    assert!(reopened.catalog().unwrap().is_type("Catalog"));
}

#[test]
fn test_deleted_objects_are_chained_free() {
    let mut doc = open(&simple_pdf());
    doc.delete_object(ObjRef::new(5, 0));
    doc.delete_object(ObjRef::new(3, 0));
    let out = save(&doc);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("xref\n0 1\n0000000003 65535 f\r\n3 1\n0000000005 00001 f\r\n5 1\n0000000000 00001 f\r\n"));

    let reopened = open(&out);
    assert_eq!(*reopened.get_object(ObjRef::new(5, 0)).unwrap(), PdfObject::Null);
    assert!(matches!(reopened.xref().get(3), Some(XrefEntry::Free { .. })));
}

#[test]
fn test_clean_document_writes_empty_revision() {
    let doc = open(&tiny_pdf());
    assert!(!doc.is_dirty());
    let out = save(&doc);
    let reopened = open(&out);
    assert_eq!(reopened.trailers().len(), 2);
    assert!(reopened.catalog().is_ok());
}

#[test]
fn test_saving_a_rebuilt_document_lists_every_object() {
    let bytes = simple_pdf();
    let broken_at = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    let mut broken = bytes[..broken_at].to_vec();
    broken.extend_from_slice(b"startxref\n0\n%%EOF\n");
    let doc = open(&broken);
    assert!(doc.recovered());

    let reopened = open(&save(&doc));
    assert!(!reopened.recovered());
    assert_eq!(reopened.xref().object_count(), 5);
    assert!(!reopened.trailer().contains_key("Prev"));
}

#[test]
fn test_saving_a_rebuilt_document_reemits_compressed_objects() {
    let bytes = object_stream_pdf();
    let broken_at = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    let mut broken = bytes[..broken_at].to_vec();
    broken.extend_from_slice(b"startxref\n12\n%%EOF\n");
    let doc = open(&broken);
    assert!(doc.recovered());

    let reopened = open(&save(&doc));
    assert!(!reopened.recovered());
    assert!(matches!(reopened.xref().get(1), Some(XrefEntry::InFile { .. })));
    assert!(reopened.catalog().unwrap().is_type("Catalog"));
}

#[test]
fn test_file_writer_round_trips_values() {
    let value = PdfObject::Array(vec![
        PdfObject::real(3.25),
        PdfObject::real(-0.5),
        PdfObject::real(1e-7),
        PdfObject::integer(-42),
        PdfObject::name("With Space#Hash"),
        PdfObject::string(vec![0x00, 0xFF, 0x10]),
        PdfObject::string(b"paren ( and \\ backslash".to_vec()),
        PdfObject::Boolean(false),
        PdfObject::Null,
        PdfObject::Dictionary(dict(&[("Nested", PdfObject::Array(Vec::new()))])),
    ]);
    let mut w = FileWriter::new("1.7");
    let holder = w.add(value.clone());
    let catalog = w.add(dict(&[("Type", name("Catalog"))]));
    w.set_root(catalog);

    let doc = open(&w.to_bytes().unwrap());
    assert_eq!(*doc.get_object(holder).unwrap(), value);
}

#[test]
fn test_serialized_text_is_reparsed_identically() {
    let value = PdfObject::Dictionary(dict(&[
        ("Type", name("Annot")),
        ("Rect", PdfObject::Array(vec![PdfObject::integer(0), PdfObject::real(10.5)])),
        ("Parent", ObjRef::new(7, 2).into()),
    ]));
    assert_eq!(
        to_bytes(&value),
        b"<</Type /Annot /Rect [0 10.5] /Parent 7 2 R>>".to_vec()
    );
}
