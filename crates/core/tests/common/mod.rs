//! Fixture files shared by the integration tests.

#![allow(dead_code)]

use quire_core::codec::flateencode;
use quire_core::{Dictionary, FileWriter, ObjRef, PdfObject, PdfStream};

pub const CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET";

pub fn dict(entries: &[(&str, PdfObject)]) -> Dictionary {
    entries
        .iter()
        .map(|(k, v)| ((*k).into(), v.clone()))
        .collect()
}

pub fn name(n: &str) -> PdfObject {
    PdfObject::name(n)
}

/// Catalog 1, Pages 2, Page 3, content stream 4, Info 5.
pub fn populate(w: &mut FileWriter) -> ObjRef {
    let catalog = w.reserve();
    let pages = w.reserve();
    let page = w.reserve();
    let content = w.add(PdfStream::new(
        dict(&[("Filter", name("FlateDecode"))]),
        flateencode(CONTENT).unwrap(),
    ));
    w.set(
        page,
        dict(&[
            ("Type", name("Page")),
            ("Parent", pages.into()),
            (
                "MediaBox",
                PdfObject::Array(vec![
                    PdfObject::integer(0),
                    PdfObject::integer(0),
                    PdfObject::integer(612),
                    PdfObject::integer(792),
                ]),
            ),
            ("Contents", content.into()),
        ]),
    );
    w.set(
        pages,
        dict(&[
            ("Type", name("Pages")),
            ("Kids", PdfObject::Array(vec![page.into()])),
            ("Count", PdfObject::integer(1)),
        ]),
    );
    w.set(
        catalog,
        dict(&[("Type", name("Catalog")), ("Pages", pages.into())]),
    );
    let info = w.add(dict(&[
        ("Title", PdfObject::string(b"Fixture".to_vec())),
        ("Producer", PdfObject::string(b"quire".to_vec())),
    ]));
    w.set_root(catalog);
    w.set_trailer_entry("Info", info);
    catalog
}

/// Classic `xref` table.
pub fn simple_pdf() -> Vec<u8> {
    let mut w = FileWriter::new("1.4");
    populate(&mut w);
    w.to_bytes().unwrap()
}

/// Cross-reference stream, no object streams.
pub fn xref_stream_pdf() -> Vec<u8> {
    let mut w = FileWriter::new("1.5").xref_stream(true);
    populate(&mut w);
    w.to_bytes().unwrap()
}

/// Dictionaries packed into an object stream.
pub fn object_stream_pdf() -> Vec<u8> {
    let mut w = FileWriter::new("1.5").object_streams(true);
    populate(&mut w);
    w.to_bytes().unwrap()
}

/// Offset of the first occurrence of `needle`.
pub fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
