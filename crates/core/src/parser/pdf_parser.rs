//! PDF object parser - turns lexer tokens into PDF objects.
//!
//! `ObjectParser` builds direct objects, folding `N G R` into references
//! with a small token lookahead. [`parse_indirect_object`] reads a whole
//! `N G obj ... endobj` block, including the stream payload that may
//! follow a dictionary.

use super::lexer::{Keyword, Lexer, Token};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, ObjRef, PdfNumber, PdfObject, PdfStream, PdfString};
use bytes::Bytes;
use std::collections::VecDeque;

/// Default bound on array/dictionary nesting.
pub const DEFAULT_MAX_NESTING: usize = 256;

/// Resolves indirect `Length` values while a stream is being read.
pub trait ObjectLocator {
    /// Integer value of the referenced object, if it can be found.
    fn stream_length(&self, reference: ObjRef) -> Option<i64>;
}

/// Locator for standalone parsing; indirect lengths fall back to scanning.
pub struct NoLocator;

impl ObjectLocator for NoLocator {
    fn stream_length(&self, _reference: ObjRef) -> Option<i64> {
        None
    }
}

/// PDF object parser over a borrowed buffer.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Lookahead buffer for tokens
    lookahead: VecDeque<(usize, Token)>,
    max_nesting: usize,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: VecDeque::new(),
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    pub const fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Position of the next unread token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .front()
            .map_or(self.lexer.tell(), |(pos, _)| *pos)
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.set_pos(pos);
    }

    /// Get next token (from lookahead or lexer)
    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop_front() {
            return Ok(Some(tok));
        }
        self.lexer.next_token()
    }

    /// Look at the `n`th upcoming token without consuming it.
    pub fn peek_token(&mut self, n: usize) -> Result<Option<&Token>> {
        while self.lookahead.len() <= n {
            match self.lexer.next_token()? {
                Some(tok) => self.lookahead.push_back(tok),
                None => return Ok(None),
            }
        }
        Ok(self.lookahead.get(n).map(|(_, tok)| tok))
    }

    /// Parse next PDF object
    pub fn parse_object(&mut self) -> Result<PdfObject> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<PdfObject> {
        let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(pos, token, depth)
    }

    fn token_to_object(&mut self, pos: usize, token: Token, depth: usize) -> Result<PdfObject> {
        match token {
            Token::Number(n) => {
                if let Some(reference) = self.try_reference(token_int(n))? {
                    return Ok(PdfObject::Reference(reference));
                }
                Ok(PdfObject::Number(n))
            }
            Token::Name(name) => Ok(PdfObject::Name(name)),
            Token::LiteralString(bytes) => Ok(PdfObject::String(PdfString::literal(bytes))),
            Token::HexString(bytes) => Ok(PdfObject::String(PdfString::hex(bytes))),
            Token::ArrayStart => self.parse_array(pos, depth + 1),
            Token::DictStart => self.parse_dict(pos, depth + 1).map(PdfObject::Dictionary),
            Token::Keyword(Keyword::True) => Ok(PdfObject::Boolean(true)),
            Token::Keyword(Keyword::False) => Ok(PdfObject::Boolean(false)),
            Token::Keyword(Keyword::Null) => Ok(PdfObject::Null),
            Token::Keyword(kw) => Err(PdfError::parse(
                pos,
                format!(
                    "unexpected keyword '{}'",
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            )),
            Token::ArrayEnd => Err(PdfError::parse(pos, "unexpected ']'")),
            Token::DictEnd => Err(PdfError::parse(pos, "unexpected '>>'")),
        }
    }

    /// `<int> <int> R` after the first integer has been consumed.
    fn try_reference(&mut self, first: Option<i64>) -> Result<Option<ObjRef>> {
        let Some(number) = first else {
            return Ok(None);
        };
        let generation = match self.peek_token(0)? {
            Some(tok) => tok.as_integer(),
            None => None,
        };
        let Some(generation) = generation else {
            return Ok(None);
        };
        if !matches!(self.peek_token(1)?, Some(Token::Keyword(Keyword::R))) {
            return Ok(None);
        }
        let (Ok(number), Ok(generation)) = (u32::try_from(number), u16::try_from(generation))
        else {
            return Ok(None);
        };
        self.lookahead.pop_front();
        self.lookahead.pop_front();
        Ok(Some(ObjRef::new(number, generation)))
    }

    fn check_depth(&self, pos: usize, depth: usize) -> Result<()> {
        if depth > self.max_nesting {
            return Err(PdfError::parse(
                pos,
                format!("nesting deeper than {}", self.max_nesting),
            ));
        }
        Ok(())
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, start: usize, depth: usize) -> Result<PdfObject> {
        self.check_depth(start, depth)?;
        let mut items = Vec::new();
        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::ArrayEnd {
                return Ok(PdfObject::Array(items));
            }
            items.push(self.token_to_object(pos, token, depth)?);
        }
    }

    /// Parse dictionary contents until >>
    fn parse_dict(&mut self, start: usize, depth: usize) -> Result<Dictionary> {
        self.check_depth(start, depth)?;
        let mut dict = Dictionary::new();
        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            let key = match token {
                Token::DictEnd => return Ok(dict),
                Token::Name(name) => name,
                other => {
                    return Err(PdfError::parse(
                        pos,
                        format!("dictionary key must be a name, got {other:?}"),
                    ));
                }
            };
            if matches!(self.peek_token(0)?, Some(Token::DictEnd)) {
                return Err(PdfError::parse(
                    self.tell(),
                    format!("missing value for key /{key}"),
                ));
            }
            let value = self.parse_nested(depth)?;
            dict.insert(key, value);
        }
    }
}

fn token_int(n: PdfNumber) -> Option<i64> {
    match n {
        PdfNumber::Integer(v) if v >= 0 => Some(v),
        _ => None,
    }
}

/// Read the indirect object that starts at `offset` in `source`.
///
/// Stream payloads are zero-copy slices of `source`.
pub fn parse_indirect_object(
    source: &Bytes,
    offset: usize,
    locator: &dyn ObjectLocator,
) -> Result<(ObjRef, PdfObject)> {
    parse_indirect_object_with(source, offset, locator, DEFAULT_MAX_NESTING)
}

/// [`parse_indirect_object`] with an explicit nesting bound.
pub fn parse_indirect_object_with(
    source: &Bytes,
    offset: usize,
    locator: &dyn ObjectLocator,
    max_nesting: usize,
) -> Result<(ObjRef, PdfObject)> {
    let data: &[u8] = source.as_ref();
    if offset >= data.len() {
        return Err(PdfError::parse(
            offset,
            format!("object offset beyond end of data ({} bytes)", data.len()),
        ));
    }
    let mut parser = ObjectParser::at(data, offset).with_max_nesting(max_nesting);

    let number = expect_integer(&mut parser, offset, "object number")?;
    let generation = expect_integer(&mut parser, offset, "generation number")?;
    match parser.next_token()? {
        Some((_, Token::Keyword(Keyword::Obj))) => {}
        Some((pos, other)) => {
            return Err(PdfError::parse(pos, format!("expected 'obj', got {other:?}")));
        }
        None => return Err(PdfError::UnexpectedEof),
    }
    let (Ok(number), Ok(generation)) = (u32::try_from(number), u16::try_from(generation)) else {
        return Err(PdfError::parse(offset, "object number out of range"));
    };
    let reference = ObjRef::new(number, generation);

    let object = parser.parse_object()?;
    let PdfObject::Dictionary(dict) = object else {
        skip_endobj(&mut parser, reference)?;
        return Ok((reference, object));
    };
    if !matches!(parser.peek_token(0)?, Some(Token::Keyword(Keyword::Stream))) {
        skip_endobj(&mut parser, reference)?;
        return Ok((reference, PdfObject::Dictionary(dict)));
    }

    let stream_at = parser.tell();
    let start = skip_stream_eol(data, stream_at + b"stream".len());
    let (end, resume) = stream_extent(data, start, &dict, locator, reference);
    let raw = source.slice(start..end);
    parser.set_pos(resume);
    skip_endstream(&mut parser);
    skip_endobj(&mut parser, reference)?;

    Ok((
        reference,
        PdfObject::Stream(Box::new(PdfStream::loaded(dict, raw, reference, false))),
    ))
}

fn expect_integer(parser: &mut ObjectParser<'_>, offset: usize, what: &str) -> Result<i64> {
    match parser.next_token()? {
        Some((pos, tok)) => match tok.as_integer() {
            Some(n) if n >= 0 => Ok(n),
            _ => Err(PdfError::parse(pos, format!("expected {what}, got {tok:?}"))),
        },
        None => Err(PdfError::parse(offset, format!("expected {what}, got end of data"))),
    }
}

/// Missing `endobj` is tolerated.
fn skip_endobj(parser: &mut ObjectParser<'_>, reference: ObjRef) -> Result<()> {
    if matches!(parser.peek_token(0), Ok(Some(Token::Keyword(Keyword::EndObj)))) {
        parser.next_token()?;
    } else {
        tracing::trace!(%reference, "object without endobj");
    }
    Ok(())
}

fn skip_endstream(parser: &mut ObjectParser<'_>) {
    if matches!(parser.peek_token(0), Ok(Some(Token::Keyword(Keyword::EndStream)))) {
        parser.lookahead.pop_front();
    }
}

/// Skip the EOL that follows `stream`: CRLF, LF or a lone CR.
fn skip_stream_eol(data: &[u8], mut pos: usize) -> usize {
    // Some writers put spaces before the EOL.
    while matches!(data.get(pos), Some(b' ' | b'\t')) {
        pos += 1;
    }
    match (data.get(pos), data.get(pos + 1)) {
        (Some(b'\r'), Some(b'\n')) => pos + 2,
        (Some(b'\r' | b'\n'), _) => pos + 1,
        _ => pos,
    }
}

/// Payload end and the position to resume parsing at.
fn stream_extent(
    data: &[u8],
    start: usize,
    dict: &Dictionary,
    locator: &dyn ObjectLocator,
    reference: ObjRef,
) -> (usize, usize) {
    let length = match dict.get("Length") {
        Some(PdfObject::Number(n)) => Some(n.as_i64()),
        Some(PdfObject::Reference(r)) => locator.stream_length(*r),
        _ => None,
    };

    if let Some(length) = length.and_then(|n| usize::try_from(n).ok()) {
        let end = start.saturating_add(length);
        if end <= data.len() && endstream_follows(data, end) {
            return (end, end);
        }
        tracing::warn!(%reference, length, "stream Length does not reach endstream, scanning");
    }

    match find_endstream(&data[start..]) {
        Some((payload_len, keyword_at)) => (start + payload_len, start + keyword_at),
        None => {
            tracing::warn!(%reference, "stream without endstream");
            (data.len(), data.len())
        }
    }
}

fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while matches!(data.get(pos), Some(b) if super::lexer::is_whitespace(*b)) {
        pos += 1;
    }
    data[pos.min(data.len())..].starts_with(b"endstream")
}

/// Find `endstream`; returns the payload length with one trailing EOL
/// trimmed and the keyword offset.
pub(crate) fn find_endstream(data: &[u8]) -> Option<(usize, usize)> {
    const NEEDLE: &[u8] = b"endstream";
    let at = data.windows(NEEDLE.len()).position(|w| w == NEEDLE)?;
    let mut end = at;
    if end >= 2 && &data[end - 2..end] == b"\r\n" {
        end -= 2;
    } else if end >= 1 && matches!(data[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    Some((end, at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_endstream_trims_one_eol() {
        assert_eq!(find_endstream(b"abc\r\nendstream"), Some((3, 5)));
        assert_eq!(find_endstream(b"abc\n\nendstream"), Some((4, 5)));
        assert_eq!(find_endstream(b"abc"), None);
    }

    #[test]
    fn stream_eol_variants() {
        assert_eq!(skip_stream_eol(b"\r\nX", 0), 2);
        assert_eq!(skip_stream_eol(b"\nX", 0), 1);
        assert_eq!(skip_stream_eol(b"\rX", 0), 1);
        assert_eq!(skip_stream_eol(b"X", 0), 0);
    }
}
