//! Brute-force rebuild of the object table when the xref chain is unusable.

use super::xref::{XrefEntry, XrefTable};
use crate::api::options::OpenOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjRef, PdfObject};
use crate::parser::lexer::is_regular;
use crate::parser::pdf_parser::ObjectParser;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

static OBJ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,10})\s+(\d{1,5})\s+obj\b").expect("static pattern"));
static TRAILER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"trailer\s*<<").expect("static pattern"));

/// Keys that only make sense on a cross-reference stream dictionary.
pub(crate) const STREAM_ONLY_KEYS: [&str; 10] = [
    "Type", "W", "Index", "Length", "Filter", "DecodeParms", "XRefStm", "F", "DP", "DL",
];

/// Table and trailer recovered by scanning the whole file.
#[derive(Debug, Clone)]
pub struct Rebuilt {
    pub table: XrefTable,
    pub trailer: Dictionary,
    /// Object streams found during the scan, in file order.
    pub object_streams: Vec<u32>,
}

/// Scan for `N G obj` headers and trailers.
///
/// `base` is the header offset; recorded offsets are relative to it.
pub fn rebuild(source: &Bytes, base: usize, options: &OpenOptions) -> Result<Rebuilt> {
    let data: &[u8] = source.as_ref();
    let limit = options
        .max_rebuild_bytes
        .map_or(data.len(), |max| max.min(data.len()));
    let scan = &data[..limit];
    tracing::warn!(bytes = limit, "rebuilding cross-reference table by scanning");

    let mut table = XrefTable::new();
    let mut catalog: Option<ObjRef> = None;
    let mut xref_dicts: Vec<Dictionary> = Vec::new();
    let mut object_streams: Vec<u32> = Vec::new();

    for cap in OBJ_HEADER.captures_iter(scan) {
        options.check_cancelled()?;
        let Some(whole) = cap.get(0) else { continue };
        let start = whole.start();
        if start < base || (start > 0 && is_regular(scan[start - 1])) {
            continue;
        }
        let (Some(number), Some(generation)) = (parse_num::<u32>(&cap[1]), parse_num::<u16>(&cap[2]))
        else {
            continue;
        };

        let replace = match table.get(number) {
            Some(XrefEntry::InFile { generation: old, .. }) => generation >= *old,
            _ => true,
        };
        if !replace {
            continue;
        }
        table.insert(
            number,
            XrefEntry::InFile {
                offset: start - base,
                generation,
            },
        );

        // Only the object's leading dictionary is needed to classify it.
        let mut parser = ObjectParser::at(scan, whole.end()).with_max_nesting(options.max_nesting);
        let Ok(PdfObject::Dictionary(dict)) = parser.parse_object() else {
            continue;
        };
        match dict.get_name("Type") {
            Some("Catalog") => catalog = Some(ObjRef::new(number, generation)),
            Some("ObjStm") => {
                if !object_streams.contains(&number) {
                    object_streams.push(number);
                }
            }
            Some("XRef") if dict.contains_key("Root") => xref_dicts.push(dict),
            _ => {}
        }
    }

    if table.is_empty() {
        return Err(PdfError::DocumentUnreadable("no objects found".into()));
    }

    let trailers = find_trailers(scan, options.max_nesting);
    let roots_known = |dict: &Dictionary| {
        dict.get("Root")
            .and_then(|r| r.as_reference().ok())
            .is_some_and(|r| table.contains(r.number))
    };

    let mut trailer = if let Some(t) = trailers.iter().rev().find(|t| roots_known(t)) {
        t.clone()
    } else if let Some(t) = xref_dicts.iter().rev().find(|t| roots_known(t)) {
        t.clone()
    } else if let Some(root) = catalog {
        tracing::warn!(%root, "no usable trailer, using last catalog object");
        let mut t = trailers.last().cloned().unwrap_or_default();
        t.insert("Root", root);
        t
    } else {
        return Err(PdfError::DocumentUnreadable(
            "no trailer and no catalog object".into(),
        ));
    };

    for key in STREAM_ONLY_KEYS {
        trailer.remove(key);
    }
    trailer.remove("Prev");
    trailer.insert("Size", i64::from(table.max_object_number()) + 1);

    tracing::debug!(
        objects = table.len(),
        object_streams = object_streams.len(),
        "rebuilt object table"
    );
    Ok(Rebuilt {
        table,
        trailer,
        object_streams,
    })
}

fn parse_num<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Every parseable `trailer << ... >>` in file order.
fn find_trailers(data: &[u8], max_nesting: usize) -> Vec<Dictionary> {
    TRAILER
        .find_iter(data)
        .filter_map(|m| {
            let dict_at = m.end() - 2;
            let mut parser = ObjectParser::at(data, dict_at).with_max_nesting(max_nesting);
            match parser.parse_object() {
                Ok(PdfObject::Dictionary(dict)) => Some(dict),
                _ => None,
            }
        })
        .collect()
}
