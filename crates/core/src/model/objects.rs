//! PDF object types.
//!
//! The primitive object model: a closed tagged union over the nine PDF
//! object kinds. Indirect references are plain `(number, generation)`
//! pairs resolved through the owning [`Document`](crate::document::Document),
//! so object graphs never own each other and cycles are harmless.

use crate::error::{PdfError, Result};
use crate::utils::{decode_text, is_pdfdoc_text};
use bytes::Bytes;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A PDF name, stored decoded (without the leading slash, `#xx` resolved).
pub type Name = SmolStr;

/// Numeric value. Integers and reals compare by value.
#[derive(Debug, Clone, Copy)]
pub enum PdfNumber {
    Integer(i64),
    Real(f64),
}

impl PdfNumber {
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Integer(n) => n as f64,
            Self::Real(n) => n,
        }
    }

    /// Integer value; reals are truncated toward zero.
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Integer(n) => n,
            Self::Real(n) => n as i64,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Integer(_))
    }
}

impl PartialEq for PdfNumber {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

/// How a string was written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringFormat {
    #[default]
    Literal,
    Hex,
}

/// A PDF string: raw bytes plus the syntax they were read from.
///
/// Equality and hashing look at the bytes only.
#[derive(Debug, Clone, Default)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    pub format: StringFormat,
}

impl PdfString {
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            format: StringFormat::Literal,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            format: StringFormat::Hex,
        }
    }

    /// Build a text string, using PDFDocEncoding when possible and UTF-16BE otherwise.
    pub fn from_text(text: &str) -> Self {
        if let Some(bytes) = crate::utils::encode_pdfdoc(text) {
            return Self::literal(bytes);
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self::literal(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the bytes form a text string (BOM-prefixed or printable PDFDocEncoding).
    pub fn is_text(&self) -> bool {
        self.bytes.starts_with(&[0xFE, 0xFF])
            || self.bytes.starts_with(&[0xEF, 0xBB, 0xBF])
            || is_pdfdoc_text(&self.bytes)
    }

    /// Decode as a text string (UTF-16BE, UTF-8 or PDFDocEncoding).
    pub fn to_text(&self) -> String {
        decode_text(&self.bytes)
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl Hash for PdfString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjRef {
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Insertion-ordered dictionary. Equality ignores key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Name, PdfObject>);

impl Dictionary {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfObject> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<PdfObject>) -> Option<PdfObject> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Name, PdfObject> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    /// Direct integer value of `key`, if present and numeric.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64().ok())
    }

    /// Direct name value of `key`.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_name().ok())
    }

    /// Whether `/Type` equals `ty`.
    pub fn is_type(&self, ty: &str) -> bool {
        self.get_name("Type") == Some(ty)
    }
}

impl FromIterator<(Name, PdfObject)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Name, PdfObject)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Dictionary {
    type Item = (Name, PdfObject);
    type IntoIter = indexmap::map::IntoIter<Name, PdfObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a PdfObject);
    type IntoIter = indexmap::map::Iter<'a, Name, PdfObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// PDF Stream - dictionary attributes + encoded payload.
#[derive(Debug, Clone)]
pub struct PdfStream {
    /// Stream dictionary
    pub dict: Dictionary,
    /// Raw (still encoded, possibly encrypted) data
    raw: Bytes,
    /// Reference the stream was loaded under
    origin: Option<ObjRef>,
    /// Whether `raw` is still ciphertext
    encrypted: bool,
}

impl PdfStream {
    /// Create a plaintext stream. `Length` is fixed up by the writer.
    pub fn new(dict: Dictionary, raw: impl Into<Bytes>) -> Self {
        Self {
            dict,
            raw: raw.into(),
            origin: None,
            encrypted: false,
        }
    }

    pub(crate) fn loaded(dict: Dictionary, raw: Bytes, origin: ObjRef, encrypted: bool) -> Self {
        Self {
            dict,
            raw,
            origin: Some(origin),
            encrypted,
        }
    }

    /// Get raw (undecoded) data.
    pub fn raw(&self) -> &[u8] {
        self.raw.as_ref()
    }

    /// Raw data as shared bytes.
    pub fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    pub const fn origin(&self) -> Option<ObjRef> {
        self.origin
    }

    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Replace the payload with plaintext data.
    pub fn set_raw(&mut self, data: impl Into<Bytes>) {
        self.raw = data.into();
        self.encrypted = false;
    }

    pub(crate) fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    pub fn get(&self, name: &str) -> Option<&PdfObject> {
        self.dict.get(name)
    }
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.raw == other.raw
    }
}

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PdfObject {
    #[default]
    Null,
    Boolean(bool),
    Number(PdfNumber),
    String(PdfString),
    Name(Name),
    Array(Vec<Self>),
    Dictionary(Dictionary),
    Stream(Box<PdfStream>),
    Reference(ObjRef),
}

impl PdfObject {
    pub fn name(name: &str) -> Self {
        Self::Name(Name::new(name))
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PdfString::literal(bytes))
    }

    pub const fn integer(n: i64) -> Self {
        Self::Number(PdfNumber::Integer(n))
    }

    pub const fn real(n: f64) -> Self {
        Self::Number(PdfNumber::Real(n))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    /// Integer value (reals are truncated).
    pub const fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Number(n) => Ok(n.as_i64()),
            _ => Err(self.type_error("number")),
        }
    }

    /// Numeric value (int or real coerced to f64)
    pub const fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(n.as_f64()),
            _ => Err(self.type_error("number")),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(self.type_error("name")),
        }
    }

    pub const fn as_string(&self) -> Result<&PdfString> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    /// String bytes.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        self.as_string().map(PdfString::as_bytes)
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    /// Dictionary, or a stream's dictionary.
    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Self::Dictionary(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(self.type_error("dict")),
        }
    }

    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.type_error("stream")),
        }
    }

    pub const fn as_reference(&self) -> Result<ObjRef> {
        match self {
            Self::Reference(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Name(_) => "name",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Reference(_) => "ref",
        }
    }

    const fn type_error(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }
}

impl From<bool> for PdfObject {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for PdfObject {
    fn from(n: i64) -> Self {
        Self::integer(n)
    }
}

impl From<i32> for PdfObject {
    fn from(n: i32) -> Self {
        Self::integer(n as i64)
    }
}

impl From<u32> for PdfObject {
    fn from(n: u32) -> Self {
        Self::integer(n as i64)
    }
}

impl From<f64> for PdfObject {
    fn from(n: f64) -> Self {
        Self::real(n)
    }
}

impl From<Name> for PdfObject {
    fn from(name: Name) -> Self {
        Self::Name(name)
    }
}

impl From<PdfString> for PdfObject {
    fn from(s: PdfString) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Self>> for PdfObject {
    fn from(arr: Vec<Self>) -> Self {
        Self::Array(arr)
    }
}

impl From<Dictionary> for PdfObject {
    fn from(d: Dictionary) -> Self {
        Self::Dictionary(d)
    }
}

impl From<PdfStream> for PdfObject {
    fn from(s: PdfStream) -> Self {
        Self::Stream(Box::new(s))
    }
}

impl From<ObjRef> for PdfObject {
    fn from(r: ObjRef) -> Self {
        Self::Reference(r)
    }
}
