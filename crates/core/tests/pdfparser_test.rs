//! Object parser and indirect-object reader.

use bytes::Bytes;
use quire_core::parser::{NoLocator, ObjectLocator, ObjectParser, parse_indirect_object};
use quire_core::{ObjRef, PdfError, PdfObject};

#[test]
fn test_parse_simple_dict() {
    let mut parser = ObjectParser::new(b"<< /Type /Page /Count 5 >>");
    let obj = parser.parse_object().unwrap();

    let dict = obj.as_dict().unwrap();
    assert_eq!(dict.get("Type").unwrap().as_name().unwrap(), "Page");
    assert_eq!(dict.get("Count").unwrap().as_i64().unwrap(), 5);
}

#[test]
fn test_parse_nested_dict() {
    let mut parser = ObjectParser::new(b"<< /Resources << /Font << /F1 1 0 R >> >> >>");
    let obj = parser.parse_object().unwrap();

    let resources = obj.as_dict().unwrap().get("Resources").unwrap().as_dict().unwrap();
    let font = resources.get("Font").unwrap().as_dict().unwrap();
    assert_eq!(font.get("F1").unwrap().as_reference().unwrap(), ObjRef::new(1, 0));
}

#[test]
fn test_parse_array() {
    let mut parser = ObjectParser::new(b"[ 1 2 3 /Name (string) ]");
    let arr = parser.parse_object().unwrap();
    let arr = arr.as_array().unwrap();
    assert_eq!(arr.len(), 5);
    assert_eq!(arr[2].as_i64().unwrap(), 3);
    assert_eq!(arr[3].as_name().unwrap(), "Name");
    assert_eq!(arr[4].as_bytes().unwrap(), b"string");
}

#[test]
fn test_references_need_two_integers_and_r() {
    let mut parser = ObjectParser::new(b"[ 1 0 R 2 0 R 3 4 5 -1 0 R ]");
    let obj = parser.parse_object().unwrap();
    let arr = obj.as_array().unwrap();
    assert_eq!(arr[0], PdfObject::Reference(ObjRef::new(1, 0)));
    assert_eq!(arr[1], PdfObject::Reference(ObjRef::new(2, 0)));
    assert_eq!(arr[2], PdfObject::integer(3));
    assert_eq!(arr[3], PdfObject::integer(4));
    assert_eq!(arr[4], PdfObject::integer(5));
    // a negative number never starts a reference
    assert_eq!(arr[5], PdfObject::integer(-1));
}

#[test]
fn test_parse_keywords() {
    let mut parser = ObjectParser::new(b"null true false");
    assert_eq!(parser.parse_object().unwrap(), PdfObject::Null);
    assert_eq!(parser.parse_object().unwrap(), PdfObject::Boolean(true));
    assert_eq!(parser.parse_object().unwrap(), PdfObject::Boolean(false));
    assert!(matches!(parser.parse_object(), Err(PdfError::UnexpectedEof)));
}

#[test]
fn test_dict_key_without_value_is_an_error() {
    let mut parser = ObjectParser::new(b"<< /A 1 /B >>");
    assert!(matches!(parser.parse_object(), Err(PdfError::Parse { .. })));
}

#[test]
fn test_non_name_key_is_an_error() {
    let mut parser = ObjectParser::new(b"<< 1 2 >>");
    assert!(parser.parse_object().unwrap_err().is_syntax());
}

#[test]
fn test_nesting_limit() {
    let deep = format!("{}{}", "[".repeat(10), "]".repeat(10));
    let mut parser = ObjectParser::new(deep.as_bytes()).with_max_nesting(9);
    assert!(parser.parse_object().is_err());
    let mut parser = ObjectParser::new(deep.as_bytes()).with_max_nesting(10);
    assert!(parser.parse_object().is_ok());
}

#[test]
fn test_hex_and_literal_strings_compare_by_bytes() {
    let mut parser = ObjectParser::new(b"(AB) <4142>");
    let a = parser.parse_object().unwrap();
    let b = parser.parse_object().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_indirect_object() {
    let source = Bytes::from_static(b"7 0 obj\n<< /A [1 2] >>\nendobj\n");
    let (reference, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    assert_eq!(reference, ObjRef::new(7, 0));
    assert_eq!(obj.as_dict().unwrap().get("A").unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn test_indirect_object_without_endobj() {
    let source = Bytes::from_static(b"3 1 obj 42 4 0 obj");
    let (reference, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    assert_eq!(reference, ObjRef::new(3, 1));
    assert_eq!(obj, PdfObject::integer(42));
}

#[test]
fn test_stream_uses_direct_length() {
    let source = Bytes::from_static(b"1 0 obj << /Length 5 >>\r\nstream\r\nhelloendstream endobj");
    let (_, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    assert_eq!(obj.as_stream().unwrap().raw(), b"hello");
}

#[test]
fn test_stream_with_wrong_length_scans_for_endstream() {
    let source = Bytes::from_static(b"1 0 obj << /Length 99 >>\nstream\nhello world\nendstream\nendobj");
    let (_, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    assert_eq!(obj.as_stream().unwrap().raw(), b"hello world");
}

struct FixedLength(i64);

impl ObjectLocator for FixedLength {
    fn stream_length(&self, reference: ObjRef) -> Option<i64> {
        (reference == ObjRef::new(9, 0)).then_some(self.0)
    }
}

#[test]
fn test_stream_length_through_reference() {
    let source = Bytes::from_static(b"1 0 obj << /Length 9 0 R >>\nstream\nabc\nendstream\nendobj");
    let (_, obj) = parse_indirect_object(&source, 0, &FixedLength(3)).unwrap();
    assert_eq!(obj.as_stream().unwrap().raw(), b"abc");

    // unresolvable reference falls back to scanning
    let (_, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    assert_eq!(obj.as_stream().unwrap().raw(), b"abc");
}

#[test]
fn test_stream_payload_is_a_slice_of_the_source() {
    let source = Bytes::from_static(b"1 0 obj << /Length 3 >>\nstream\nxyz\nendstream\nendobj");
    let (_, obj) = parse_indirect_object(&source, 0, &NoLocator).unwrap();
    let raw = obj.as_stream().unwrap().raw_bytes();
    assert_eq!(raw.as_ptr(), source[31..].as_ptr());
}

#[test]
fn test_offset_beyond_data() {
    let source = Bytes::from_static(b"1 0 obj 1 endobj");
    assert!(parse_indirect_object(&source, 100, &NoLocator).is_err());
}
