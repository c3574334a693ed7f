//! AES-CBC helpers for the standard security handlers.

use crate::error::{PdfError, Result};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

const BLOCK: usize = 16;

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<()> {
    if iv.len() != BLOCK {
        return Err(PdfError::UnsupportedEncryption(format!(
            "AES IV must be 16 bytes, got {}",
            iv.len()
        )));
    }
    if key.len() != 16 && key.len() != 32 {
        return Err(PdfError::UnsupportedEncryption(format!(
            "AES key must be 16 or 32 bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

/// Decrypt AES-CBC data with a 128 or 256 bit key, without removing padding.
///
/// A trailing partial block is dropped.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv)?;
    let mut buf = data[..data.len() - data.len() % BLOCK].to_vec();
    let unpad_err = |_| PdfError::UnsupportedEncryption("AES block decryption failed".into());
    if key.len() == 16 {
        Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(unpad_err)?;
    } else {
        Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(unpad_err)?;
    }
    Ok(buf)
}

/// Encrypt AES-CBC data with a 128 or 256 bit key.
///
/// With `pad` the input is PKCS#7 padded; otherwise its length must already
/// be a multiple of 16.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8], pad: bool) -> Result<Vec<u8>> {
    check_lengths(key, iv)?;
    if !pad && data.len() % BLOCK != 0 {
        return Err(PdfError::UnsupportedEncryption(
            "unpadded AES input must be block aligned".into(),
        ));
    }
    let msg_len = data.len();
    let mut buf = data.to_vec();
    if pad {
        buf.resize(msg_len + BLOCK - msg_len % BLOCK, 0);
    }
    let pad_err = |_| PdfError::UnsupportedEncryption("AES block encryption failed".into());
    let written = match (key.len(), pad) {
        (16, true) => Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, msg_len)
            .map_err(pad_err)?
            .len(),
        (16, false) => Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
            .map_err(pad_err)?
            .len(),
        (_, true) => Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, msg_len)
            .map_err(pad_err)?
            .len(),
        (_, false) => Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
            .map_err(pad_err)?
            .len(),
    };
    buf.truncate(written);
    Ok(buf)
}

/// Remove PKCS#7 padding from AES-decrypted data.
///
/// Returns data unchanged if padding is invalid:
/// - Padding byte value is 0 or > 16
/// - Not enough bytes for claimed padding
/// - Padding bytes are not all equal to the padding length
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > BLOCK || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b as usize == pad_len) {
        &data[..start]
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_restores_plaintext() {
        let key = [7u8; 16];
        let iv = [1u8; 16];
        let ciphertext = aes_cbc_encrypt(&key, &iv, b"attack at dawn", true).unwrap();
        assert_eq!(ciphertext.len(), 16);
        let plaintext = aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(unpad_aes(&plaintext), b"attack at dawn");
    }

    #[test]
    fn aligned_input_gets_a_full_padding_block() {
        let key = [9u8; 32];
        let iv = [0u8; 16];
        let ciphertext = aes_cbc_encrypt(&key, &iv, &[0x42; 16], true).unwrap();
        assert_eq!(ciphertext.len(), 32);
    }

    #[test]
    fn bad_key_length_is_an_error() {
        assert!(aes_cbc_decrypt(&[0u8; 5], &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn unpad_rejects_inconsistent_padding() {
        assert_eq!(unpad_aes(&[1, 2, 3, 2]), &[1, 2, 3, 2]);
        assert_eq!(unpad_aes(&[1, 2, 2, 2]), &[1, 2]);
    }
}
