//! Flate (zlib) codec built on flate2.

use super::filters::{DecodeResult, FilterError};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{Read, Write};

const FLATE: &str = "FlateDecode";

/// Inflate zlib data.
///
/// Corrupt input is an error whose `partial` holds everything that could
/// be inflated before the damage.
pub fn flatedecode(data: &[u8]) -> DecodeResult {
    flatedecode_with_limit(data, usize::MAX)
}

/// Inflate at most `limit` bytes. Streams without a zlib header are
/// inflated as raw deflate data.
pub fn flatedecode_with_limit(data: &[u8], limit: usize) -> DecodeResult {
    let zlib = has_zlib_header(data);
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(3).min(limit));
    let read = if zlib {
        ZlibDecoder::new(data).take(cap).read_to_end(&mut out)
    } else {
        DeflateDecoder::new(data).take(cap).read_to_end(&mut out)
    };
    match read {
        Ok(_) if out.len() > limit => {
            out.truncate(limit);
            Err(FilterError::new(
                FLATE,
                format!("output exceeds {limit} bytes"),
                out,
            ))
        }
        Ok(_) => Ok(out),
        Err(err) => {
            let partial = inflate_partial(data, zlib, limit);
            let partial = if partial.len() >= out.len() { partial } else { out };
            Err(FilterError::new(FLATE, err.to_string(), partial))
        }
    }
}

/// CMF/FLG check from RFC 1950: deflate method and a header divisible by 31.
fn has_zlib_header(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0F == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}

/// Byte-at-a-time inflate that stops at the first decoder error.
fn inflate_partial(data: &[u8], zlib: bool, limit: usize) -> Vec<u8> {
    let mut decoder = Decompress::new(zlib);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() && out.len() < limit {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out.truncate(limit);
    out
}

/// Deflate data with the default compression level.
pub fn flateencode(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
