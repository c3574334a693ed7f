//! Cross-reference sections and the merged object table.
//!
//! Offsets stored here are relative to the `%PDF-` header, exactly as they
//! appear in the file. The owning document adds the header position when
//! it seeks.

use crate::api::options::OpenOptions;
use crate::codec::filters::FilterChain;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjRef, PdfObject};
use crate::parser::lexer::{Keyword, Lexer, Token};
use crate::parser::pdf_parser::{NoLocator, ObjectParser, parse_indirect_object};
use crate::utils::nunpack;
use bytes::Bytes;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// How far into the file the `%PDF-` header may start.
pub const HEADER_WINDOW: usize = 1024;

/// Location of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrefEntry {
    Free { next: u32, generation: u16 },
    InFile { offset: usize, generation: u16 },
    InObjectStream { stream: u32, index: u32 },
}

impl XrefEntry {
    /// Generation recorded for the entry; compressed objects are always 0.
    pub const fn generation(&self) -> u16 {
        match self {
            Self::Free { generation, .. } | Self::InFile { generation, .. } => *generation,
            Self::InObjectStream { .. } => 0,
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }
}

/// Object number -> location, merged across revisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    /// Insert unless the number is already present (newer revisions win).
    pub fn insert_if_absent(&mut self, number: u32, entry: XrefEntry) -> bool {
        match self.entries.entry(number) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn insert(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefEntry)> {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    /// Number of objects that are not free.
    pub fn object_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_free()).count()
    }

    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Merge an older section underneath this table.
    pub fn merge_older(&mut self, older: &BTreeMap<u32, XrefEntry>) {
        for (&number, &entry) in older {
            self.insert_if_absent(number, entry);
        }
    }
}

/// One section as read from the file.
#[derive(Debug, Clone, Default)]
pub struct XrefSection {
    pub entries: BTreeMap<u32, XrefEntry>,
    pub trailer: Dictionary,
    /// Offset of the section, relative to the header.
    pub offset: usize,
    pub is_stream: bool,
}

/// Result of walking the `Prev` chain from `startxref`.
#[derive(Debug, Clone, Default)]
pub struct XrefChain {
    pub table: XrefTable,
    /// Trailers newest first.
    pub trailers: Vec<Dictionary>,
    pub sections: Vec<XrefSection>,
}

/// Locate `%PDF-` and read the version; returns (header offset, version).
pub fn find_header(data: &[u8]) -> Option<(usize, String)> {
    const MAGIC: &[u8] = b"%PDF-";
    let window = &data[..data.len().min(HEADER_WINDOW + MAGIC.len())];
    let at = window.windows(MAGIC.len()).position(|w| w == MAGIC)?;
    let version: String = data[at + MAGIC.len()..]
        .iter()
        .take(8)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    Some((at, version))
}

/// Find the value of the last `startxref` within `window` bytes of EOF.
pub fn find_startxref(data: &[u8], window: usize) -> Result<usize> {
    const NEEDLE: &[u8] = b"startxref";
    let start = data.len().saturating_sub(window);
    let tail = &data[start..];
    let at = tail
        .windows(NEEDLE.len())
        .rposition(|w| w == NEEDLE)
        .ok_or_else(|| PdfError::XrefCorrupt("startxref not found".into()))?;
    let mut lexer = Lexer::at(data, start + at + NEEDLE.len());
    match lexer.next_token() {
        Ok(Some((_, tok))) => tok
            .as_integer()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PdfError::XrefCorrupt(format!("bad startxref value {tok:?}"))),
        _ => Err(PdfError::XrefCorrupt("startxref without offset".into())),
    }
}

/// Read the section at `offset` (relative to `base`), classic or stream.
/// A cross-reference stream may inflate to at most `max_decoded` bytes.
pub fn read_section(
    source: &Bytes,
    base: usize,
    offset: usize,
    max_decoded: usize,
) -> Result<XrefSection> {
    let data: &[u8] = source.as_ref();
    let abs = base
        .checked_add(offset)
        .filter(|&abs| abs < data.len())
        .ok_or_else(|| PdfError::XrefCorrupt(format!("xref offset {offset} beyond end of file")))?;

    let mut lexer = Lexer::at(data, abs);
    let first = lexer.next_token().map_err(corrupt)?;
    let mut section = match first {
        Some((_, Token::Keyword(Keyword::Xref))) => read_classic(data, lexer.tell())?,
        Some((_, Token::Number(_))) => read_stream(source, abs, max_decoded)?,
        other => {
            return Err(PdfError::XrefCorrupt(format!(
                "no xref at offset {offset}: found {other:?}"
            )));
        }
    };
    section.offset = offset;
    Ok(section)
}

fn corrupt(err: PdfError) -> PdfError {
    match err {
        PdfError::XrefCorrupt(_) | PdfError::Cancelled => err,
        other => PdfError::XrefCorrupt(other.to_string()),
    }
}

/// Classic `xref` table body starting right after the keyword.
fn read_classic(data: &[u8], pos: usize) -> Result<XrefSection> {
    let mut parser = ObjectParser::at(data, pos);
    let mut section = XrefSection::default();

    loop {
        let (at, token) = parser
            .next_token()
            .map_err(corrupt)?
            .ok_or_else(|| PdfError::XrefCorrupt("xref table without trailer".into()))?;
        if token.is_keyword(&Keyword::Trailer) {
            break;
        }
        let start = token
            .as_integer()
            .ok_or_else(|| PdfError::XrefCorrupt(format!("bad subsection header at {at}")))?;
        let count = next_int(&mut parser, "subsection count")?;
        read_subsection(&mut parser, start, count, &mut section.entries)?;
    }

    section.trailer = match parser.parse_object().map_err(corrupt)? {
        PdfObject::Dictionary(dict) => dict,
        other => {
            return Err(PdfError::XrefCorrupt(format!(
                "trailer is a {}, not a dictionary",
                other.type_name()
            )));
        }
    };
    Ok(section)
}

fn next_int(parser: &mut ObjectParser<'_>, what: &str) -> Result<i64> {
    match parser.next_token().map_err(corrupt)? {
        Some((_, tok)) => tok
            .as_integer()
            .ok_or_else(|| PdfError::XrefCorrupt(format!("expected {what}, got {tok:?}"))),
        None => Err(PdfError::XrefCorrupt(format!("expected {what}, got end of data"))),
    }
}

/// Records are read field-wise, so `\n`-only line ends and missing
/// trailing spaces are fine.
fn read_subsection(
    parser: &mut ObjectParser<'_>,
    start: i64,
    count: i64,
    entries: &mut BTreeMap<u32, XrefEntry>,
) -> Result<()> {
    let mut start = u32::try_from(start)
        .map_err(|_| PdfError::XrefCorrupt(format!("bad subsection start {start}")))?;
    let count = u32::try_from(count)
        .map_err(|_| PdfError::XrefCorrupt(format!("bad subsection count {count}")))?;

    for i in 0..count {
        let offset = next_int(parser, "entry offset")?;
        let generation = next_int(parser, "entry generation")?;
        let kind = match parser.next_token().map_err(corrupt)? {
            Some((_, Token::Keyword(Keyword::Other(kind)))) if kind == b"n" || kind == b"f" => {
                kind[0]
            }
            other => {
                return Err(PdfError::XrefCorrupt(format!(
                    "bad xref entry type {other:?}"
                )));
            }
        };

        // A table that starts at 1 but lists the free head first is off by one.
        if i == 0 && start == 1 && offset == 0 && generation == 65535 && kind == b'f' {
            tracing::warn!("xref subsection starts at 1 with the free list head, shifting to 0");
            start = 0;
        }

        let number = start + i;
        let generation = u16::try_from(generation).unwrap_or(u16::MAX);
        let entry = if kind == b'n' {
            let Ok(offset) = usize::try_from(offset) else {
                continue;
            };
            // offset 0 cannot hold an object
            if offset == 0 {
                continue;
            }
            XrefEntry::InFile { offset, generation }
        } else {
            XrefEntry::Free {
                next: u32::try_from(offset).unwrap_or(0),
                generation,
            }
        };
        entries.entry(number).or_insert(entry);
    }
    Ok(())
}

/// Cross-reference stream (`Type XRef`) at absolute position `abs`.
fn read_stream(source: &Bytes, abs: usize, max_decoded: usize) -> Result<XrefSection> {
    let (_, object) = parse_indirect_object(source, abs, &NoLocator).map_err(corrupt)?;
    let PdfObject::Stream(stream) = object else {
        return Err(PdfError::XrefCorrupt(format!(
            "object at {abs} is not an xref stream"
        )));
    };
    let dict = &stream.dict;
    if dict.get_name("Type").is_some_and(|t| t != "XRef") {
        return Err(PdfError::XrefCorrupt(format!("stream at {abs} is not Type XRef")));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array().ok())
        .map(|w| {
            w.iter()
                .map(|v| v.as_i64().ok().and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
                .collect()
        })
        .unwrap_or_default();
    if widths.len() < 3 || widths.iter().any(|&w| w > 8) {
        return Err(PdfError::XrefCorrupt(format!("bad W array {widths:?}")));
    }
    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(PdfError::XrefCorrupt("xref stream with zero-width records".into()));
    }

    let size = dict.get_i64("Size").unwrap_or(0);
    let index: Vec<i64> = match dict.get("Index").and_then(|v| v.as_array().ok()) {
        Some(arr) => arr.iter().filter_map(|v| v.as_i64().ok()).collect(),
        None => vec![0, size],
    };

    // No table exists yet, so indirect Filter/DecodeParms values are
    // found by their object header.
    let resolve = |obj: &PdfObject| match obj {
        PdfObject::Reference(reference) => scan_for_object(source, *reference).unwrap_or_else(|| {
            tracing::warn!(%reference, "indirect filter entry of xref stream not found");
            PdfObject::Null
        }),
        other => other.clone(),
    };
    let data = FilterChain::from_dict(dict, resolve)
        .decode_with_limit(stream.raw(), max_decoded)
        .map_err(|e| PdfError::XrefCorrupt(format!("xref stream does not decode: {e}")))?;

    let mut entries = BTreeMap::new();
    let mut records = data.chunks_exact(record_len);
    'ranges: for pair in index.chunks_exact(2) {
        let (Ok(start), Ok(count)) = (u32::try_from(pair[0]), u32::try_from(pair[1])) else {
            continue;
        };
        for i in 0..count {
            let Some(record) = records.next() else {
                tracing::warn!("xref stream ends before its Index is exhausted");
                break 'ranges;
            };
            let (f1, rest) = record.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let f3 = &f3[..widths[2]];
            let kind = nunpack(f1, 1);
            let entry = match kind {
                0 => XrefEntry::Free {
                    next: nunpack(f2, 0) as u32,
                    generation: nunpack(f3, 0) as u16,
                },
                1 => XrefEntry::InFile {
                    offset: nunpack(f2, 0) as usize,
                    generation: nunpack(f3, 0) as u16,
                },
                2 => XrefEntry::InObjectStream {
                    stream: nunpack(f2, 0) as u32,
                    index: nunpack(f3, 0) as u32,
                },
                // unknown types are treated as null objects
                _ => continue,
            };
            entries.entry(start + i).or_insert(entry);
        }
    }

    Ok(XrefSection {
        entries,
        trailer: stream.dict.clone(),
        offset: 0,
        is_stream: true,
    })
}

/// The last definition of `reference` in the file, found by searching
/// for its `N G obj` header.
fn scan_for_object(source: &Bytes, reference: ObjRef) -> Option<PdfObject> {
    let data: &[u8] = source.as_ref();
    let header = format!("{} {} obj", reference.number, reference.generation);
    let header = header.as_bytes();
    let mut end = data.len();
    while let Some(at) = data[..end].windows(header.len()).rposition(|w| w == header) {
        if (at == 0 || !data[at - 1].is_ascii_digit())
            && let Ok((found, obj)) = parse_indirect_object(source, at, &NoLocator)
            && found == reference
        {
            tracing::debug!(%reference, offset = at, "resolved xref stream entry by scan");
            return Some(obj);
        }
        end = at;
    }
    None
}

/// Walk `startxref` -> `Prev` -> ... newest first, merging as we go.
///
/// Failure to read the newest section or a `Prev` loop is an error; an
/// unreadable older section ends the chain with a warning.
pub fn load_chain(source: &Bytes, base: usize, startxref: usize, options: &OpenOptions) -> Result<XrefChain> {
    let mut chain = XrefChain::default();
    let mut visited = FxHashSet::default();
    let mut next = Some(startxref);

    while let Some(offset) = next.take() {
        options.check_cancelled()?;
        if !visited.insert(offset) {
            return Err(PdfError::XrefCorrupt(format!("Prev loop at offset {offset}")));
        }
        if chain.sections.len() >= options.max_xref_sections {
            return Err(PdfError::XrefCorrupt(format!(
                "more than {} xref sections",
                options.max_xref_sections
            )));
        }

        let section = match read_section(source, base, offset, options.max_decoded_bytes) {
            Ok(section) => section,
            Err(err) if chain.sections.is_empty() => return Err(err),
            Err(err) => {
                tracing::warn!(offset, error = %err, "older xref section unreadable, ignoring");
                break;
            }
        };
        tracing::debug!(
            offset,
            entries = section.entries.len(),
            stream = section.is_stream,
            "loaded xref section"
        );

        // Hybrid file: the XRefStm entries take precedence over this
        // section's classic entries.
        if !section.is_stream
            && let Some(stm_offset) = section.trailer.get_i64("XRefStm")
            && let Ok(stm_offset) = usize::try_from(stm_offset)
            && visited.insert(stm_offset)
        {
            match read_section(source, base, stm_offset, options.max_decoded_bytes) {
                Ok(stm) if stm.is_stream => {
                    tracing::debug!(offset = stm_offset, entries = stm.entries.len(), "loaded XRefStm");
                    chain.table.merge_older(&stm.entries);
                }
                Ok(_) => tracing::warn!(offset = stm_offset, "XRefStm does not point at a stream"),
                Err(err) => tracing::warn!(offset = stm_offset, error = %err, "XRefStm unreadable"),
            }
        }

        chain.table.merge_older(&section.entries);
        next = section
            .trailer
            .get_i64("Prev")
            .and_then(|p| usize::try_from(p).ok());
        chain.trailers.push(section.trailer.clone());
        chain.sections.push(section);
    }

    Ok(chain)
}
