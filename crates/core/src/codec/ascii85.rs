//! ASCII85 and ASCIIHex stream decoders.

use super::filters::{DecodeResult, FilterError};

const A85: &str = "ASCII85Decode";
const AHX: &str = "ASCIIHexDecode";

const fn is_white(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\x00')
}

/// Decode ASCII85-encoded data (PDF variant).
///
/// Handles an optional `<~` prefix, `z` groups, embedded whitespace, a
/// missing or partial `~>` marker and a short final group.
pub fn ascii85decode(data: &[u8]) -> DecodeResult {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut out = Vec::with_capacity(data.len() * 4 / 5 + 4);
    let mut group = [0u8; 5];
    let mut filled = 0;

    for (pos, &byte) in data.iter().enumerate() {
        match byte {
            b if is_white(b) => {}
            b'z' if filled == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'z' => {
                return Err(FilterError::new(
                    A85,
                    format!("'z' inside a group at byte {pos}"),
                    out,
                ));
            }
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
                if filled == 5 {
                    let value = group_value(&group).ok_or_else(|| {
                        FilterError::new(A85, format!("group overflow at byte {pos}"), out.clone())
                    })?;
                    out.extend_from_slice(&value.to_be_bytes());
                    filled = 0;
                }
            }
            _ => {
                return Err(FilterError::new(
                    A85,
                    format!("illegal character 0x{byte:02x} at byte {pos}"),
                    out,
                ));
            }
        }
    }

    // A lone trailing character carries no data.
    if filled > 1 {
        let mut padded = [b'u' - b'!'; 5];
        padded[..filled].copy_from_slice(&group[..filled]);
        let value = group_value(&padded)
            .ok_or_else(|| FilterError::new(A85, "final group overflow", out.clone()))?;
        out.extend_from_slice(&value.to_be_bytes()[..filled - 1]);
    }

    Ok(out)
}

fn group_value(digits: &[u8; 5]) -> Option<u32> {
    digits
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
}

/// Decode ASCIIHex-encoded data.
///
/// Whitespace is skipped, `>` ends the data and an odd final digit is
/// padded with `0`.
pub fn asciihexdecode(data: &[u8]) -> DecodeResult {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for (pos, &byte) in data.iter().enumerate() {
        if byte == b'>' {
            break;
        }
        if is_white(byte) {
            continue;
        }
        let Some(nibble) = hex_nibble(byte) else {
            return Err(FilterError::new(
                AHX,
                format!("illegal character 0x{byte:02x} at byte {pos}"),
                out,
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

    Ok(out)
}

pub(crate) const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
