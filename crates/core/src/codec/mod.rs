//! Codec modules for PDF stream compression and encryption.
//!
//! This module contains:
//! - `aes`: AES-CBC encryption/decryption
//! - `arcfour`: RC4 encryption
//! - `ascii85`: ASCII85 and ASCIIHex decoding
//! - `flate`: zlib inflate/deflate
//! - `lzw`: LZW decompression
//! - `runlength`: Run-length coding
//! - `predictor`: TIFF and PNG predictors
//! - `filters`: the `Filter`/`DecodeParms` pipeline

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod filters;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

// Re-export main functions for convenience
pub use aes::{aes_cbc_decrypt, aes_cbc_encrypt, unpad_aes};
pub use arcfour::Arcfour;
pub use ascii85::{ascii85decode, asciihexdecode};
pub use filters::{DecodeResult, FilterChain, FilterError, FilterKind, FilterStage, decode};
pub use flate::{flatedecode, flatedecode_with_limit, flateencode};
pub use lzw::{lzwdecode, lzwdecode_with_earlychange, lzwdecode_with_limit};
pub use predictor::{PredictorParams, apply_predictor};
pub use runlength::{rldecode, rldecode_with_limit, rlencode};
