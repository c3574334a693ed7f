//! Text and byte helpers shared by the parser, resolver and writer.

/// PDFDocEncoding table - maps bytes 0-255 to Unicode code points.
const PDF_DOC_ENCODING: [u32; 256] = [
    0x0000, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005, 0x0006, 0x0007, 0x0008, 0x0009, 0x000A, 0x000B,
    0x000C, 0x000D, 0x000E, 0x000F, 0x0010, 0x0011, 0x0012, 0x0013, 0x0014, 0x0015, 0x0016, 0x0017,
    0x02D8, 0x02C7, 0x02C6, 0x02D9, 0x02DD, 0x02DB, 0x02DA, 0x02DC, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x2022, 0x2020, 0x2021, 0x2026,
    0x2014, 0x2013, 0x0192, 0x2044, 0x2039, 0x203A, 0x2212, 0x2030, 0x201E, 0x201C, 0x201D, 0x2018,
    0x2019, 0x201A, 0x2122, 0xFB01, 0xFB02, 0x0141, 0x0152, 0x0160, 0x0178, 0x017D, 0x0131, 0x0142,
    0x0153, 0x0161, 0x017E, 0x0000, 0x20AC, 0x00A1, 0x00A2, 0x00A3, 0x00A4, 0x00A5, 0x00A6, 0x00A7,
    0x00A8, 0x00A9, 0x00AA, 0x00AB, 0x00AC, 0x0000, 0x00AE, 0x00AF, 0x00B0, 0x00B1, 0x00B2, 0x00B3,
    0x00B4, 0x00B5, 0x00B6, 0x00B7, 0x00B8, 0x00B9, 0x00BA, 0x00BB, 0x00BC, 0x00BD, 0x00BE, 0x00BF,
    0x00C0, 0x00C1, 0x00C2, 0x00C3, 0x00C4, 0x00C5, 0x00C6, 0x00C7, 0x00C8, 0x00C9, 0x00CA, 0x00CB,
    0x00CC, 0x00CD, 0x00CE, 0x00CF, 0x00D0, 0x00D1, 0x00D2, 0x00D3, 0x00D4, 0x00D5, 0x00D6, 0x00D7,
    0x00D8, 0x00D9, 0x00DA, 0x00DB, 0x00DC, 0x00DD, 0x00DE, 0x00DF, 0x00E0, 0x00E1, 0x00E2, 0x00E3,
    0x00E4, 0x00E5, 0x00E6, 0x00E7, 0x00E8, 0x00E9, 0x00EA, 0x00EB, 0x00EC, 0x00ED, 0x00EE, 0x00EF,
    0x00F0, 0x00F1, 0x00F2, 0x00F3, 0x00F4, 0x00F5, 0x00F6, 0x00F7, 0x00F8, 0x00F9, 0x00FA, 0x00FB,
    0x00FC, 0x00FD, 0x00FE, 0x00FF,
];

/// Decodes a PDF text string to Unicode.
///
/// UTF-16BE and UTF-8 are recognised by their byte order marks; everything
/// else is read as PDFDocEncoding.
pub fn decode_text(s: &[u8]) -> String {
    if let Some(rest) = s.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = s.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        s.iter()
            .filter_map(|&c| char::from_u32(PDF_DOC_ENCODING[c as usize]))
            .collect()
    }
}

/// Whether every byte is a printable PDFDocEncoding character or common whitespace.
pub fn is_pdfdoc_text(s: &[u8]) -> bool {
    s.iter().all(|&c| match c {
        b'\t' | b'\n' | b'\r' | 0x0C => true,
        0x00..=0x17 => false,
        _ => PDF_DOC_ENCODING[c as usize] != 0,
    })
}

/// Encodes text as PDFDocEncoding, or `None` if a character has no mapping.
pub fn encode_pdfdoc(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| {
            let cp = ch as u32;
            if cp < 0x18 || (0x20..0x7F).contains(&cp) {
                return Some(cp as u8);
            }
            PDF_DOC_ENCODING
                .iter()
                .skip(0x18)
                .position(|&mapped| mapped == cp && mapped != 0)
                .map(|idx| (idx + 0x18) as u8)
        })
        .collect()
}

/// Unpacks a big-endian unsigned integer of arbitrary width.
///
/// An empty slice yields `default`, which is how zero-width xref stream
/// fields take their implied value.
pub fn nunpack(s: &[u8], default: u64) -> u64 {
    if s.is_empty() {
        return default;
    }
    s.iter().fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nunpack() {
        assert_eq!(nunpack(b"", 7), 7);
        assert_eq!(nunpack(&[0x01], 0), 1);
        assert_eq!(nunpack(&[0x01, 0x00], 0), 256);
        assert_eq!(nunpack(&[0x00, 0x01, 0x02], 0), 258);
    }

    #[test]
    fn test_decode_text_utf16() {
        assert_eq!(decode_text(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
    }

    #[test]
    fn test_decode_text_pdfdoc() {
        assert_eq!(decode_text(b"caf\xe9"), "caf\u{e9}");
        assert_eq!(decode_text(&[0x80]), "\u{2022}");
    }

    #[test]
    fn test_encode_pdfdoc() {
        assert_eq!(encode_pdfdoc("caf\u{e9}"), Some(b"caf\xe9".to_vec()));
        assert_eq!(encode_pdfdoc("\u{2022}"), Some(vec![0x80]));
        assert_eq!(encode_pdfdoc("\u{4e2d}"), None);
    }

    #[test]
    fn test_is_pdfdoc_text() {
        assert!(is_pdfdoc_text(b"Hello, world\n"));
        assert!(!is_pdfdoc_text(&[0x00, 0x01, 0x02]));
    }
}
