//! Appending a revision to an existing file.
//!
//! The revision holds the changed objects, a classic xref section that
//! covers exactly those objects, and a trailer whose `Prev` points at the
//! previous `startxref`. The original bytes are never touched.

use super::serialize::{write_indirect, write_object};
use crate::document::catalog::{Document, Edit};
use crate::document::repair::STREAM_ONLY_KEYS;
use crate::document::security::SecurityHandler;
use crate::document::xref::XrefEntry;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjRef, PdfObject, PdfStream, PdfString};
use std::collections::BTreeMap;
use std::io::Write;

/// One line of the revision's xref section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XrefLine {
    InUse { offset: usize, generation: u16 },
    Free { next: u32, generation: u16 },
}

/// Write the revision for `dirty` to `sink`, which already holds
/// `base_offset` bytes (the original file plus any separator).
///
/// Returns the new `startxref` value, relative to the `%PDF-` header like
/// every other offset in the file.
pub fn write_revision<W: Write>(
    doc: &Document,
    dirty: &[ObjRef],
    sink: &mut W,
    base_offset: usize,
) -> Result<usize> {
    if let Some(err) = doc.security_error()
        && !dirty.is_empty()
    {
        // Plaintext cannot be written into a file we cannot encrypt.
        return Err(err);
    }

    let header = doc.header_offset();
    let mut buf: Vec<u8> = Vec::new();
    let mut lines: BTreeMap<u32, XrefLine> = BTreeMap::new();
    let mut deleted: Vec<ObjRef> = Vec::new();

    let mut refs = dirty.to_vec();
    refs.sort_unstable();
    refs.dedup_by_key(|r| r.number);

    for reference in refs {
        match doc.edit(reference.number) {
            Some(Edit::Set(target, obj)) => {
                let offset = base_offset + buf.len() - header;
                let obj = prepare(doc, *target, obj)?;
                write_indirect(*target, &obj, &mut buf)?;
                lines.insert(
                    target.number,
                    XrefLine::InUse {
                        offset,
                        generation: target.generation,
                    },
                );
            }
            Some(Edit::Delete(target)) => deleted.push(*target),
            None => {
                tracing::warn!(%reference, "dirty object without a pending edit");
            }
        }
    }

    if doc.recovered() {
        // The rebuilt table exists only in memory; write it out in full.
        for (number, entry) in doc.xref().iter() {
            if number == 0 || lines.contains_key(&number) || doc.edit(number).is_some() {
                continue;
            }
            match *entry {
                XrefEntry::InFile { offset, generation } => {
                    lines.insert(number, XrefLine::InUse { offset, generation });
                }
                XrefEntry::InObjectStream { .. } => {
                    let reference = ObjRef::new(number, 0);
                    let obj = match doc.get_object(reference) {
                        Ok(obj) => obj,
                        Err(err) => {
                            tracing::warn!(%reference, error = %err, "dropping unreadable object");
                            continue;
                        }
                    };
                    let offset = base_offset + buf.len() - header;
                    let obj = prepare(doc, reference, &obj)?;
                    write_indirect(reference, &obj, &mut buf)?;
                    lines.insert(number, XrefLine::InUse { offset, generation: 0 });
                }
                XrefEntry::Free { .. } => {}
            }
        }
    }

    // Free list: 0 -> first deleted -> ... -> 0.
    deleted.sort_unstable();
    let first_free = deleted.first().map_or(0, |r| r.number);
    lines.insert(
        0,
        XrefLine::Free {
            next: first_free,
            generation: 65535,
        },
    );
    for (i, target) in deleted.iter().enumerate() {
        let next = deleted.get(i + 1).map_or(0, |r| r.number);
        lines.insert(
            target.number,
            XrefLine::Free {
                next,
                generation: target.generation.saturating_add(1),
            },
        );
    }

    let startxref = base_offset + buf.len() - header;
    write_xref_section(&lines, &mut buf)?;

    let trailer = revision_trailer(doc, &lines);
    buf.extend_from_slice(b"trailer\n");
    write_object(&PdfObject::Dictionary(trailer), &mut buf)?;
    write!(buf, "\nstartxref\n{startxref}\n%%EOF\n")?;

    sink.write_all(&buf)?;
    tracing::debug!(
        objects = lines.len() - 1,
        deleted = deleted.len(),
        startxref,
        "wrote incremental revision"
    );
    Ok(startxref)
}

/// Write `xref` with one subsection per run of consecutive numbers.
fn write_xref_section<W: Write>(lines: &BTreeMap<u32, XrefLine>, out: &mut W) -> Result<()> {
    out.write_all(b"xref\n")?;
    let entries: Vec<(u32, XrefLine)> = lines.iter().map(|(n, l)| (*n, *l)).collect();
    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len() && entries[end].0 == entries[end - 1].0 + 1 {
            end += 1;
        }
        writeln!(out, "{} {}", entries[start].0, end - start)?;
        for (_, line) in &entries[start..end] {
            match *line {
                XrefLine::InUse { offset, generation } => {
                    write!(out, "{offset:010} {generation:05} n\r\n")?;
                }
                XrefLine::Free { next, generation } => {
                    write!(out, "{next:010} {generation:05} f\r\n")?;
                }
            }
        }
        start = end;
    }
    Ok(())
}

fn revision_trailer(doc: &Document, lines: &BTreeMap<u32, XrefLine>) -> Dictionary {
    let mut trailer = doc.trailer().clone();
    for key in STREAM_ONLY_KEYS {
        trailer.remove(key);
    }
    trailer.remove("Prev");
    for (key, value) in doc.trailer_edits() {
        trailer.insert(key.clone(), value.clone());
    }

    let old_size = trailer.get_i64("Size").unwrap_or(0).max(0);
    let highest = lines
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0)
        .max(doc.xref().max_object_number());
    let size = old_size.max(i64::from(highest) + 1);
    trailer.insert("Size", size);

    match doc.startxref() {
        Some(prev) if !doc.recovered() => {
            trailer.insert("Prev", prev as i64);
        }
        _ => {}
    }
    trailer
}

/// Encrypt `obj` for `reference` when the document has a security handler.
fn prepare(doc: &Document, reference: ObjRef, obj: &PdfObject) -> Result<PdfObject> {
    match doc.security_handler() {
        Some(handler) if doc.encrypt_ref() != Some(reference) => encrypt_object(handler, reference, obj),
        _ => plain_object(doc, obj),
    }
}

/// Without encryption, streams still holding ciphertext are decrypted first.
fn plain_object(doc: &Document, obj: &PdfObject) -> Result<PdfObject> {
    match obj {
        PdfObject::Stream(stream) if stream.is_encrypted() => {
            let origin = stream.origin().ok_or_else(|| {
                PdfError::UnsupportedEncryption("encrypted stream without origin".into())
            })?;
            let handler = doc.security_handler().ok_or_else(|| {
                doc.security_error()
                    .unwrap_or(PdfError::UnsupportedEncryption("no security handler".into()))
            })?;
            let plain = handler.decrypt_stream(origin, stream.raw(), &stream.dict)?;
            let mut out = PdfStream::new(stream.dict.clone(), plain);
            out.dict.remove("Length");
            Ok(out.into())
        }
        other => Ok(other.clone()),
    }
}

fn encrypt_object(handler: &dyn SecurityHandler, reference: ObjRef, obj: &PdfObject) -> Result<PdfObject> {
    Ok(match obj {
        PdfObject::String(s) => PdfObject::String(PdfString {
            bytes: handler.encrypt_string(reference, &s.bytes)?,
            format: s.format,
        }),
        PdfObject::Array(items) => PdfObject::Array(
            items
                .iter()
                .map(|item| encrypt_object(handler, reference, item))
                .collect::<Result<_>>()?,
        ),
        PdfObject::Dictionary(dict) => PdfObject::Dictionary(encrypt_dict(handler, reference, dict)?),
        PdfObject::Stream(stream) => {
            let dict = encrypt_dict(handler, reference, &stream.dict)?;
            let raw = match stream.origin() {
                // Still the ciphertext it was read with.
                Some(origin) if stream.is_encrypted() && origin == reference => stream.raw_bytes().to_vec(),
                Some(origin) if stream.is_encrypted() => {
                    let plain = handler.decrypt_stream(origin, stream.raw(), &stream.dict)?;
                    handler.encrypt_stream(reference, &plain, &stream.dict)?
                }
                _ => handler.encrypt_stream(reference, stream.raw(), &stream.dict)?,
            };
            PdfStream::new(dict, raw).into()
        }
        other => other.clone(),
    })
}

fn encrypt_dict(handler: &dyn SecurityHandler, reference: ObjRef, dict: &Dictionary) -> Result<Dictionary> {
    dict.iter()
        .map(|(key, value)| Ok((key.clone(), encrypt_object(handler, reference, value)?)))
        .collect()
}
