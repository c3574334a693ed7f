//! Filter chains, predictors and the simpler codecs.

mod common;

use bytes::Bytes;
use quire_core::codec::{FilterChain, decode, flateencode, rldecode, rlencode};
use quire_core::{
    Dictionary, Document, FileWriter, ObjRef, OpenOptions, PdfError, PdfObject, PdfStream,
};

fn dict(entries: &[(&str, PdfObject)]) -> Dictionary {
    entries
        .iter()
        .map(|(k, v)| ((*k).into(), v.clone()))
        .collect()
}

fn no_resolve(obj: &PdfObject) -> PdfObject {
    obj.clone()
}

fn names(list: &[&str]) -> PdfObject {
    PdfObject::Array(list.iter().map(|n| PdfObject::name(n)).collect())
}

#[test]
fn test_no_filter_is_identity() {
    assert_eq!(decode(&Dictionary::new(), b"raw", no_resolve).unwrap(), b"raw");
}

#[test]
fn test_chain_applies_in_array_order() {
    let plain = b"chained filters decode left to right";
    let mut encoded = hex::encode(flateencode(plain).unwrap()).into_bytes();
    encoded.push(b'>');
    let d = dict(&[("Filter", names(&["ASCIIHexDecode", "FlateDecode"]))]);
    assert_eq!(decode(&d, &encoded, no_resolve).unwrap(), plain);
}

#[test]
fn test_abbreviated_names() {
    let plain = b"short names";
    let encoded = flateencode(plain).unwrap();
    let d = dict(&[("Filter", PdfObject::name("Fl"))]);
    assert_eq!(decode(&d, &encoded, no_resolve).unwrap(), plain);
}

#[test]
fn test_flate_with_png_up_predictor() {
    let rows = [0u8, 1, 2, 3, 2, 1, 1, 1];
    let d = dict(&[
        ("Filter", PdfObject::name("FlateDecode")),
        (
            "DecodeParms",
            PdfObject::Dictionary(dict(&[
                ("Predictor", PdfObject::integer(12)),
                ("Columns", PdfObject::integer(3)),
            ])),
        ),
    ]);
    let out = decode(&d, &flateencode(&rows).unwrap(), no_resolve).unwrap();
    assert_eq!(out, [1, 2, 3, 2, 3, 4]);
}

#[test]
fn test_flate_with_tiff_predictor() {
    let d = dict(&[
        ("Filter", PdfObject::name("FlateDecode")),
        (
            "DecodeParms",
            PdfObject::Dictionary(dict(&[
                ("Predictor", PdfObject::integer(2)),
                ("Colors", PdfObject::integer(1)),
                ("BitsPerComponent", PdfObject::integer(8)),
                ("Columns", PdfObject::integer(2)),
            ])),
        ),
    ]);
    let out = decode(&d, &flateencode(&[1, 2, 5, 1]).unwrap(), no_resolve).unwrap();
    assert_eq!(out, [1, 3, 5, 6]);
}

#[test]
fn test_unknown_filter_is_an_error() {
    let d = dict(&[("Filter", PdfObject::name("MadeUpDecode"))]);
    let err = decode(&d, b"data", no_resolve).unwrap_err();
    assert_eq!(err.filter, "MadeUpDecode");
}

#[test]
fn test_image_filters_are_terminal() {
    let jpeg = b"\xFF\xD8\xFF\xE0 not really a jpeg";
    let d = dict(&[("Filter", names(&["FlateDecode", "DCTDecode"]))]);
    let out = decode(&d, &flateencode(jpeg).unwrap(), no_resolve).unwrap();
    assert_eq!(out, jpeg);
}

#[test]
fn test_filter_resolved_through_closure() {
    let target = ObjRef::new(8, 0);
    let d = dict(&[("Filter", PdfObject::Reference(target))]);
    let resolve = |obj: &PdfObject| match obj {
        PdfObject::Reference(r) if *r == target => PdfObject::name("ASCIIHexDecode"),
        other => other.clone(),
    };
    let chain = FilterChain::from_dict(&d, resolve);
    assert_eq!(chain.stages().len(), 1);
    assert_eq!(chain.decode(b"4869>").unwrap(), b"Hi");
}

#[test]
fn test_identity_crypt_detection() {
    let d = dict(&[("Filter", names(&["Crypt", "FlateDecode"]))]);
    assert!(FilterChain::from_dict(&d, no_resolve).starts_with_identity_crypt());

    let d = dict(&[
        ("Filter", names(&["Crypt"])),
        (
            "DecodeParms",
            PdfObject::Array(vec![PdfObject::Dictionary(dict(&[(
                "Name",
                PdfObject::name("StdCF"),
            )]))]),
        ),
    ]);
    assert!(!FilterChain::from_dict(&d, no_resolve).starts_with_identity_crypt());
}

#[test]
fn test_runlength() {
    let encoded = [2, b'a', b'b', b'c', 254, b'x', 128];
    assert_eq!(rldecode(&encoded).unwrap(), b"abcxxx");
    let data = b"aaaaaaaaaabcdefgggg";
    assert_eq!(rldecode(&rlencode(data)).unwrap(), data);
}

/// Fixture document plus one extra stream, returned with its reference.
fn pdf_with_stream(stream: PdfStream) -> (Vec<u8>, ObjRef) {
    let mut w = FileWriter::new("1.4");
    common::populate(&mut w);
    let reference = w.add(stream);
    (w.to_bytes().unwrap(), reference)
}

#[test]
fn test_document_decodes_predicted_stream_twice() {
    // Sub row then Up row
    let rows = [1u8, 10, 5, 5, 2, 1, 1, 1];
    let d = dict(&[
        ("Filter", PdfObject::name("FlateDecode")),
        (
            "DecodeParms",
            PdfObject::Dictionary(dict(&[
                ("Predictor", PdfObject::integer(12)),
                ("Columns", PdfObject::integer(3)),
            ])),
        ),
    ]);
    let (bytes, reference) = pdf_with_stream(PdfStream::new(d, flateencode(&rows).unwrap()));
    let doc = Document::new(bytes, "").unwrap();

    let object = doc.get_object(reference).unwrap();
    let stream = object.as_stream().unwrap();
    let first = doc.decode_stream(stream).unwrap();
    assert_eq!(first, [10, 15, 20, 11, 16, 21]);
    assert_eq!(doc.decode_stream(stream).unwrap(), first);

    let refetched = doc.get_object(reference).unwrap();
    assert_eq!(doc.decode_stream(refetched.as_stream().unwrap()).unwrap(), first);
}

#[test]
fn test_document_decode_limit() {
    // 128 zero bytes from three bytes of RunLength
    let d = dict(&[("Filter", PdfObject::name("RunLengthDecode"))]);
    let (bytes, reference) = pdf_with_stream(PdfStream::new(d, vec![0x81, 0x00, 0x80]));

    let options = OpenOptions::default().max_decoded_bytes(64);
    let doc = Document::from_bytes(Bytes::from(bytes.clone()), &options).unwrap();
    let object = doc.get_object(reference).unwrap();
    match doc.decode_stream(object.as_stream().unwrap()) {
        Err(PdfError::Filter(err)) => assert_eq!(err.partial.len(), 64),
        other => panic!("expected a filter error, got {other:?}"),
    }

    let doc = Document::new(bytes, "").unwrap();
    let object = doc.get_object(reference).unwrap();
    assert_eq!(doc.decode_stream(object.as_stream().unwrap()).unwrap(), vec![0u8; 128]);
}
