//! Canonical PDF syntax for objects.

use crate::model::objects::{Dictionary, Name, ObjRef, PdfNumber, PdfObject, PdfStream, PdfString, StringFormat};
use crate::parser::lexer::{is_delimiter, is_whitespace, name_to_bytes};
use std::io::{self, Write};

/// Write `obj` in PDF syntax.
pub fn write_object<W: Write>(obj: &PdfObject, out: &mut W) -> io::Result<()> {
    match obj {
        PdfObject::Null => out.write_all(b"null"),
        PdfObject::Boolean(true) => out.write_all(b"true"),
        PdfObject::Boolean(false) => out.write_all(b"false"),
        PdfObject::Number(n) => write_number(*n, out),
        PdfObject::String(s) => write_string(s, out),
        PdfObject::Name(name) => write_name(name, out),
        PdfObject::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b" ")?;
                }
                write_object(item, out)?;
            }
            out.write_all(b"]")
        }
        PdfObject::Dictionary(dict) => write_dictionary(dict, None, out),
        PdfObject::Stream(stream) => write_stream(stream, out),
        PdfObject::Reference(r) => write!(out, "{} {} R", r.number, r.generation),
    }
}

/// Serialize into a fresh buffer.
pub fn to_bytes(obj: &PdfObject) -> Vec<u8> {
    let mut out = Vec::new();
    // writing to a Vec cannot fail
    let _ = write_object(obj, &mut out);
    out
}

/// Write `N G obj ... endobj`.
pub fn write_indirect<W: Write>(reference: ObjRef, obj: &PdfObject, out: &mut W) -> io::Result<()> {
    writeln!(out, "{} {} obj", reference.number, reference.generation)?;
    write_object(obj, out)?;
    out.write_all(b"\nendobj\n")
}

/// Integers as-is; reals in plain decimal, always with a fractional part.
pub fn write_number<W: Write>(n: PdfNumber, out: &mut W) -> io::Result<()> {
    match n {
        PdfNumber::Integer(i) => write!(out, "{i}"),
        PdfNumber::Real(f) if !f.is_finite() || f == 0.0 => out.write_all(b"0.0"),
        PdfNumber::Real(f) if f.fract() == 0.0 && f.abs() < 1e15 => write!(out, "{f:.1}"),
        // f64 Display never uses an exponent
        PdfNumber::Real(f) => write!(out, "{f}"),
    }
}

/// Literal form for text, hex form for hex-read or binary strings.
pub fn write_string<W: Write>(s: &PdfString, out: &mut W) -> io::Result<()> {
    if s.format == StringFormat::Hex || !s.is_text() {
        out.write_all(b"<")?;
        for b in &s.bytes {
            write!(out, "{b:02X}")?;
        }
        return out.write_all(b">");
    }
    out.write_all(b"(")?;
    for &b in &s.bytes {
        match b {
            b'(' | b')' | b'\\' => out.write_all(&[b'\\', b])?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            0x08 => out.write_all(b"\\b")?,
            0x0C => out.write_all(b"\\f")?,
            0x00..=0x1F | 0x7F => write!(out, "\\{b:03o}")?,
            _ => out.write_all(&[b])?,
        }
    }
    out.write_all(b")")
}

/// `/Name` with `#xx` for `#`, whitespace, delimiters and bytes outside `!`..`~`.
pub fn write_name<W: Write>(name: &Name, out: &mut W) -> io::Result<()> {
    out.write_all(b"/")?;
    for b in name_to_bytes(name) {
        if b == b'#' || is_whitespace(b) || is_delimiter(b) || !(b'!'..=b'~').contains(&b) {
            write!(out, "#{b:02X}")?;
        } else {
            out.write_all(&[b])?;
        }
    }
    Ok(())
}

/// Write a dictionary, replacing `Length` with `length` when given.
fn write_dictionary<W: Write>(dict: &Dictionary, length: Option<usize>, out: &mut W) -> io::Result<()> {
    out.write_all(b"<<")?;
    let mut wrote_length = false;
    for (i, (key, value)) in dict.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write_name(key, out)?;
        out.write_all(b" ")?;
        match length {
            Some(len) if key.as_str() == "Length" => {
                write!(out, "{len}")?;
                wrote_length = true;
            }
            _ => write_object(value, out)?,
        }
    }
    if let Some(len) = length
        && !wrote_length
    {
        if !dict.is_empty() {
            out.write_all(b" ")?;
        }
        write!(out, "/Length {len}")?;
    }
    out.write_all(b">>")
}

fn write_stream<W: Write>(stream: &PdfStream, out: &mut W) -> io::Result<()> {
    let raw = stream.raw();
    write_dictionary(&stream.dict, Some(raw.len()), out)?;
    out.write_all(b"\nstream\n")?;
    out.write_all(raw)?;
    out.write_all(b"\nendstream")
}
