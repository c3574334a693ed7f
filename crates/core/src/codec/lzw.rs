//! LZW stream decoder using the weezl crate.

use super::filters::{DecodeResult, FilterError};
use weezl::{BitOrder, LzwStatus, decode::Decoder};

const LZW: &str = "LZWDecode";

/// Decode LZW-encoded data with the PDF default `EarlyChange` of 1.
pub fn lzwdecode(data: &[u8]) -> DecodeResult {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data (MSB first, 8-bit alphabet).
///
/// `EarlyChange` 1 widens the code length one code early, the same
/// switching rule TIFF uses; 0 widens it exactly at the table boundary.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> DecodeResult {
    lzwdecode_with_limit(data, early_change, usize::MAX)
}

/// Like [`lzwdecode_with_earlychange`], stopping with an error once the
/// output would pass `limit` bytes.
pub fn lzwdecode_with_limit(data: &[u8], early_change: i64, limit: usize) -> DecodeResult {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
    let mut buf = [0u8; 8192];
    let mut input = data;

    loop {
        let result = decoder.decode_bytes(input, &mut buf);
        input = &input[result.consumed_in..];
        output.extend_from_slice(&buf[..result.consumed_out]);
        if output.len() > limit {
            output.truncate(limit);
            return Err(FilterError::new(LZW, format!("output exceeds {limit} bytes"), output));
        }
        match result.status {
            Ok(LzwStatus::Done | LzwStatus::NoProgress) => break,
            Ok(LzwStatus::Ok) if result.consumed_in == 0 && result.consumed_out == 0 => break,
            Ok(LzwStatus::Ok) => {}
            Err(err) => return Err(FilterError::new(LZW, err.to_string(), output)),
        }
    }
    Ok(output)
}
