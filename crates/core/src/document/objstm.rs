//! Decoded object streams (`Type ObjStm`).

use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, PdfObject};
use crate::parser::pdf_parser::ObjectParser;

/// Decoded payload of one object stream with its parsed header.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    data: Vec<u8>,
    /// (object number, offset relative to `First`) per index.
    entries: Vec<(u32, usize)>,
    first: usize,
}

impl ObjectStream {
    /// Parse the `N` pairs of `number offset` that precede `First`.
    pub fn parse(dict: &Dictionary, data: Vec<u8>) -> Result<Self> {
        let n = dict
            .get_i64("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PdfError::parse(0, "object stream without N"))?;
        let first = dict
            .get_i64("First")
            .and_then(|f| usize::try_from(f).ok())
            .filter(|&f| f <= data.len())
            .ok_or_else(|| PdfError::parse(0, "object stream without a usable First"))?;

        let mut header = ObjectParser::new(&data[..first]);
        let mut entries = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            let Some(number) = header_int(&mut header)? else { break };
            let Some(offset) = header_int(&mut header)? else { break };
            let (Ok(number), Ok(offset)) = (u32::try_from(number), usize::try_from(offset)) else {
                return Err(PdfError::parse(0, "negative entry in object stream header"));
            };
            entries.push((number, offset));
        }
        if entries.len() < n {
            tracing::warn!(declared = n, found = entries.len(), "object stream header is short");
        }
        Ok(Self {
            data,
            entries,
            first,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object numbers in index order.
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    /// Parse the object stored at `index`; returns its number and value.
    pub fn object_at(&self, index: usize, max_nesting: usize) -> Result<(u32, PdfObject)> {
        let &(number, offset) = self.entries.get(index).ok_or_else(|| {
            PdfError::parse(0, format!("index {index} beyond object stream of {}", self.len()))
        })?;
        let at = self.first + offset;
        if at >= self.data.len() {
            return Err(PdfError::parse(at, "object stream offset beyond decoded data"));
        }
        let mut parser = ObjectParser::at(&self.data, at).with_max_nesting(max_nesting);
        Ok((number, parser.parse_object()?))
    }

    /// Index of `number`, if the stream holds it.
    pub fn index_of(&self, number: u32) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == number)
    }
}

fn header_int(parser: &mut ObjectParser<'_>) -> Result<Option<i64>> {
    match parser.next_token()? {
        Some((_, tok)) => tok
            .as_integer()
            .map(Some)
            .ok_or_else(|| PdfError::parse(0, format!("bad object stream header token {tok:?}"))),
        None => Ok(None),
    }
}
