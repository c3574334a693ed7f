//! PDF tokenizer.
//!
//! Splits raw file bytes into tokens: numbers, names, literal and hex
//! strings, array/dictionary brackets and bare keywords. Whitespace and
//! `%` comments are skipped between tokens. Every token is returned with
//! the byte offset it started at.

use crate::error::{PdfError, Result};
use crate::model::objects::{Name, PdfNumber};

/// Bare keywords. Anything not listed is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    R,
    True,
    False,
    Null,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"R" => Self::R,
            b"true" => Self::True,
            b"false" => Self::False,
            b"null" => Self::Null,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            other => Self::Other(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::R => b"R",
            Self::True => b"true",
            Self::False => b"false",
            Self::Null => b"null",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Other(bytes) => bytes.as_slice(),
        }
    }
}

/// PDF token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(PdfNumber),
    /// Name with `#xx` escapes resolved
    Name(Name),
    LiteralString(Vec<u8>),
    HexString(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(Keyword),
}

impl Token {
    /// Integer value, if this is an integer number token.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(PdfNumber::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_keyword(&self, kw: &Keyword) -> bool {
        matches!(self, Self::Keyword(k) if k == kw)
    }
}

/// PDF whitespace: NUL, TAB, LF, FF, CR, SP.
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Regular characters form names, numbers and keywords.
pub const fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Decode name bytes one byte per char, so every name round-trips.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> Name {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`name_from_bytes`]; chars above U+00FF are written as UTF-8.
pub(crate) fn name_to_bytes(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    for ch in name.chars() {
        if (ch as u32) <= 0xFF {
            out.push(ch as u8);
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

/// Byte-level tokenizer over a borrowed buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    /// Current position in the buffer.
    pub const fn tell(&self) -> usize {
        self.pos
    }

    /// Set the current position (clamped to the buffer length).
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn lex_error(&self, pos: usize, msg: impl Into<String>) -> PdfError {
        PdfError::Lex {
            pos,
            msg: msg.into(),
        }
    }

    /// Skip whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Read up to the next end of line and consume the EOL (CR, LF or CRLF).
    pub fn read_line(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        let Some(end) = find_line_end(rest) else {
            self.pos = self.data.len();
            return rest;
        };
        self.pos += end + 1;
        if rest[end] == b'\r' && rest.get(end + 1) == Some(&b'\n') {
            self.pos += 1;
        }
        &rest[..end]
    }

    /// Next token with its start offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(None);
        };

        let token = match b {
            b'/' => self.lex_name(),
            b'(' => self.lex_literal_string()?,
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Token::DictStart
            }
            b'<' => self.lex_hex_string()?,
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Token::DictEnd
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b')' | b'>' | b'{' | b'}' => {
                self.pos += 1;
                return Err(self.lex_error(start, format!("unexpected '{}'", b as char)));
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' if self.starts_number() => self.lex_number()?,
            _ => self.lex_keyword(),
        };

        Ok(Some((start, token)))
    }

    fn starts_number(&self) -> bool {
        let mut i = 0;
        while matches!(self.peek_at(i), Some(b'+' | b'-')) {
            i += 1;
        }
        if self.peek_at(i) == Some(b'.') {
            i += 1;
        }
        matches!(self.peek_at(i), Some(c) if c.is_ascii_digit())
    }

    fn lex_name(&mut self) -> Token {
        self.pos += 1; // '/'
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                let hi = self.peek_at(1).and_then(hex_value);
                let lo = self.peek_at(2).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    name.push((hi << 4) | lo);
                    self.pos += 3;
                    continue;
                }
            }
            name.push(b);
            self.pos += 1;
        }
        Token::Name(name_from_bytes(&name))
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut negative = false;
        while let Some(sign @ (b'+' | b'-')) = self.peek() {
            // "--5" and "+-5" are read as negative
            negative |= sign == b'-';
            self.pos += 1;
        }
        let digits_start = self.pos;
        let mut has_dot = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = &self.data[digits_start..self.pos];
        // Only ASCII digits and '.' were consumed.
        let text: String = text.iter().map(|&b| b as char).collect();
        let number = if has_dot {
            let value: f64 = text
                .parse()
                .map_err(|_| self.lex_error(start, format!("invalid real: {text}")))?;
            PdfNumber::Real(if negative { -value } else { value })
        } else {
            match text.parse::<i64>() {
                Ok(value) => PdfNumber::Integer(if negative { -value } else { value }),
                // Out-of-range integers degrade to reals.
                Err(_) => {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| self.lex_error(start, format!("invalid integer: {text}")))?;
                    PdfNumber::Real(if negative { -value } else { value })
                }
            }
        };
        Ok(Token::Number(number))
    }

    fn lex_literal_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;

        loop {
            let Some(c) = self.advance() else {
                return Err(self.lex_error(start, "unterminated literal string"));
            };
            match c {
                b'(' => {
                    depth += 1;
                    out.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(c);
                }
                b'\r' => {
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                b'\\' => {
                    let Some(esc) = self.advance() else {
                        return Err(self.lex_error(start, "unterminated literal string"));
                    };
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        // covers \( \) \\ and unknown escapes, which drop the backslash
                        other => out.push(other),
                    }
                }
                _ => out.push(c),
            }
        }

        Ok(Token::LiteralString(out))
    }

    fn lex_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // '<'
        let mut out = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let Some(c) = self.advance() else {
                return Err(self.lex_error(start, "unterminated hex string"));
            };
            if c == b'>' {
                break;
            }
            if is_whitespace(c) {
                continue;
            }
            let Some(nibble) = hex_value(c) else {
                return Err(self.lex_error(
                    self.pos - 1,
                    format!("invalid hex digit 0x{c:02x} in hex string"),
                ));
            };
            match pending.take() {
                Some(high) => out.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }

        if let Some(high) = pending {
            out.push(high << 4);
        }

        Ok(Token::HexString(out))
    }

    fn lex_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // Lone delimiter that no rule consumed.
            self.pos += 1;
        }
        Token::Keyword(Keyword::from_bytes(&self.data[start..self.pos]))
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(data);
        let mut out = Vec::new();
        while let Some((_, tok)) = lexer.next_token().unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn read_line_handles_crlf() {
        let mut lexer = Lexer::new(b"abc\r\ndef\rghi");
        assert_eq!(lexer.read_line(), b"abc");
        assert_eq!(lexer.read_line(), b"def");
        assert_eq!(lexer.read_line(), b"ghi");
        assert_eq!(lexer.tell(), 12);
    }

    #[test]
    fn lone_sign_is_a_keyword() {
        assert_eq!(
            tokens(b"- 5"),
            vec![
                Token::Keyword(Keyword::Other(b"-".to_vec())),
                Token::Number(PdfNumber::Integer(5))
            ]
        );
    }

    #[test]
    fn name_bytes_round_trip() {
        let name = name_from_bytes(&[b'A', 0xE9, b' ']);
        assert_eq!(name_to_bytes(&name), vec![b'A', 0xE9, b' ']);
    }
}
