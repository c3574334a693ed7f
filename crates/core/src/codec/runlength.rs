//! RunLength stream decoder.

use super::filters::{DecodeResult, FilterError};

const EOD: u8 = 128;

/// Decode RunLength-encoded data.
///
/// - Length byte 0-127: copy the next (length + 1) bytes literally
/// - Length byte 128: end of data
/// - Length byte 129-255: repeat the next byte (257 - length) times
///
/// A run cut short by the end of input yields whatever bytes are present.
pub fn rldecode(data: &[u8]) -> DecodeResult {
    rldecode_with_limit(data, usize::MAX)
}

/// Like [`rldecode`], failing once the output would pass `limit` bytes.
pub fn rldecode_with_limit(data: &[u8], limit: usize) -> DecodeResult {
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
    let mut rest = data;

    while let Some((&length, tail)) = rest.split_first() {
        rest = tail;
        match length {
            EOD => break,
            0..=127 => {
                let count = (length as usize + 1).min(rest.len());
                out.extend_from_slice(&rest[..count]);
                rest = &rest[count..];
            }
            _ => {
                let Some((&byte, tail)) = rest.split_first() else {
                    break;
                };
                out.extend(std::iter::repeat_n(byte, 257 - length as usize));
                rest = tail;
            }
        }
        if out.len() > limit {
            out.truncate(limit);
            return Err(FilterError::new(
                "RunLengthDecode",
                format!("output exceeds {limit} bytes"),
                out,
            ));
        }
    }

    Ok(out)
}

/// Encode data with RunLength, used when writing fixture streams.
pub fn rlencode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut i = 0;
    while i < data.len() {
        let run = data[i..].iter().take(128).take_while(|&&b| b == data[i]).count();
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < data.len() && i - start < 128 {
            if i + 1 < data.len() && data[i] == data[i + 1] {
                break;
            }
            i += 1;
        }
        if i == start {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out.push(EOD);
    out
}
