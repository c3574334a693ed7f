//! Stream filter pipeline.
//!
//! A [`FilterChain`] is read from a stream dictionary's `Filter` and
//! `DecodeParms` entries and applied strictly in array order. Flate and
//! LZW stages run their predictor right after decompression. Image codecs
//! are terminal: their input is returned as-is for a higher layer.
//!
//! The decompressing stages stop at a byte limit; predictors and the
//! ASCII decoders never produce more than they consume.

use super::ascii85::{ascii85decode, asciihexdecode};
use super::flate::flatedecode_with_limit;
use super::lzw::lzwdecode_with_limit;
use super::predictor::{PredictorParams, apply_predictor};
use super::runlength::rldecode_with_limit;
use crate::model::objects::{Dictionary, Name, PdfObject};
use thiserror::Error;

/// A codec failure. `partial` holds the bytes decoded before the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{filter} failed: {cause}")]
pub struct FilterError {
    pub filter: String,
    pub cause: String,
    pub partial: Vec<u8>,
}

impl FilterError {
    pub fn new(filter: &str, cause: impl Into<String>, partial: Vec<u8>) -> Self {
        Self {
            filter: filter.to_string(),
            cause: cause.into(),
            partial,
        }
    }
}

pub type DecodeResult = std::result::Result<Vec<u8>, FilterError>;

/// Filters understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    AsciiHex,
    Ascii85,
    Lzw,
    Flate,
    RunLength,
    Dct,
    Jpx,
    CcittFax,
    Jbig2,
    Crypt,
}

impl FilterKind {
    /// Look up a filter by full or abbreviated name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ASCIIHexDecode" | "AHx" => Self::AsciiHex,
            "ASCII85Decode" | "A85" => Self::Ascii85,
            "LZWDecode" | "LZW" => Self::Lzw,
            "FlateDecode" | "Fl" => Self::Flate,
            "RunLengthDecode" | "RL" => Self::RunLength,
            "DCTDecode" | "DCT" => Self::Dct,
            "JPXDecode" => Self::Jpx,
            "CCITTFaxDecode" | "CCF" => Self::CcittFax,
            "JBIG2Decode" => Self::Jbig2,
            "Crypt" => Self::Crypt,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::AsciiHex => "ASCIIHexDecode",
            Self::Ascii85 => "ASCII85Decode",
            Self::Lzw => "LZWDecode",
            Self::Flate => "FlateDecode",
            Self::RunLength => "RunLengthDecode",
            Self::Dct => "DCTDecode",
            Self::Jpx => "JPXDecode",
            Self::CcittFax => "CCITTFaxDecode",
            Self::Jbig2 => "JBIG2Decode",
            Self::Crypt => "Crypt",
        }
    }

    /// Image codecs are left encoded.
    pub const fn is_image(self) -> bool {
        matches!(self, Self::Dct | Self::Jpx | Self::CcittFax | Self::Jbig2)
    }
}

/// One `(filter name, parameters)` pair of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub name: Name,
    pub parms: Option<Dictionary>,
}

impl FilterStage {
    pub fn kind(&self) -> Option<FilterKind> {
        FilterKind::from_name(&self.name)
    }
}

/// Ordered filters of a stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    /// Read `Filter`/`DecodeParms` (or the inline-image `F`/`DP`) from a
    /// stream dictionary, resolving indirect values with `resolve`.
    pub fn from_dict<F>(dict: &Dictionary, resolve: F) -> Self
    where
        F: Fn(&PdfObject) -> PdfObject,
    {
        let Some(filter) = dict.get("Filter").or_else(|| dict.get("F")) else {
            return Self::default();
        };
        let names: Vec<Name> = match resolve(filter) {
            PdfObject::Name(name) => vec![name],
            PdfObject::Array(items) => items
                .iter()
                .filter_map(|item| match resolve(item) {
                    PdfObject::Name(name) => Some(name),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let parms: Vec<Option<Dictionary>> = match dict
            .get("DecodeParms")
            .or_else(|| dict.get("DP"))
            .map(&resolve)
        {
            Some(PdfObject::Dictionary(d)) => vec![Some(d)],
            Some(PdfObject::Array(items)) => items
                .iter()
                .map(|item| match resolve(item) {
                    PdfObject::Dictionary(d) => Some(d),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let stages = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| FilterStage {
                name,
                parms: parms.get(i).cloned().flatten(),
            })
            .collect();
        Self { stages }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the first stage is a `Crypt` filter selecting `Identity`.
    pub fn starts_with_identity_crypt(&self) -> bool {
        self.stages.first().is_some_and(|stage| {
            stage.kind() == Some(FilterKind::Crypt)
                && stage
                    .parms
                    .as_ref()
                    .and_then(|p| p.get_name("Name"))
                    .is_none_or(|name| name == "Identity")
        })
    }

    /// Run every stage over `raw`.
    pub fn decode(&self, raw: &[u8]) -> DecodeResult {
        self.decode_with_limit(raw, usize::MAX)
    }

    /// Run every stage over `raw`; a stage whose output would pass `limit`
    /// bytes fails with the truncated output as `partial`.
    pub fn decode_with_limit(&self, raw: &[u8], limit: usize) -> DecodeResult {
        let mut data = raw.to_vec();
        for stage in &self.stages {
            let Some(kind) = stage.kind() else {
                return Err(FilterError::new(
                    &stage.name,
                    "unsupported filter",
                    Vec::new(),
                ));
            };
            if kind.is_image() {
                tracing::trace!(filter = kind.name(), "leaving image data encoded");
                break;
            }
            data = decode_stage(kind, stage.parms.as_ref(), &data, limit)?;
        }
        Ok(data)
    }
}

fn decode_stage(kind: FilterKind, parms: Option<&Dictionary>, data: &[u8], limit: usize) -> DecodeResult {
    match kind {
        FilterKind::AsciiHex => asciihexdecode(data),
        FilterKind::Ascii85 => ascii85decode(data),
        FilterKind::RunLength => rldecode_with_limit(data, limit),
        FilterKind::Flate => {
            let out = flatedecode_with_limit(data, limit)?;
            apply_predictor(kind.name(), out, &PredictorParams::from_dict(parms))
        }
        FilterKind::Lzw => {
            let early = parms.and_then(|p| p.get_i64("EarlyChange")).unwrap_or(1);
            let out = lzwdecode_with_limit(data, early, limit)?;
            apply_predictor(kind.name(), out, &PredictorParams::from_dict(parms))
        }
        FilterKind::Crypt => Ok(data.to_vec()),
        FilterKind::Dct | FilterKind::Jpx | FilterKind::CcittFax | FilterKind::Jbig2 => {
            Ok(data.to_vec())
        }
    }
}

/// Decode a stream payload with the filters named in its dictionary.
pub fn decode<F>(dict: &Dictionary, raw: &[u8], resolve: F) -> DecodeResult
where
    F: Fn(&PdfObject) -> PdfObject,
{
    FilterChain::from_dict(dict, resolve).decode(raw)
}
