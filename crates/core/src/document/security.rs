//! Standard security handler: password authentication, key derivation
//! and per-object encryption for revisions 2 through 6.

use crate::codec::aes::{aes_cbc_decrypt, aes_cbc_encrypt, unpad_aes};
use crate::codec::arcfour::Arcfour;
use crate::codec::filters::{FilterChain, FilterKind};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, Name, ObjRef};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Password padding constant (Algorithm 2).
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Encrypts and decrypts the strings and streams of one document.
pub trait SecurityHandler: Send + Sync {
    /// `R` of the encryption dictionary.
    fn revision(&self) -> i64;

    fn encrypts_metadata(&self) -> bool;

    fn decrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a stream payload; `dict` selects the crypt filter.
    fn decrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>>;

    fn encrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>>;

    fn encrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>>;
}

/// Crypt filter method (`CFM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    AesV2,
    AesV3,
}

impl CryptMethod {
    fn from_cfm(cfm: &str) -> Result<Self> {
        match cfm {
            "None" | "Identity" => Ok(Self::Identity),
            "V2" => Ok(Self::Rc4),
            "AESV2" => Ok(Self::AesV2),
            "AESV3" => Ok(Self::AesV3),
            other => Err(PdfError::UnsupportedEncryption(format!(
                "unknown crypt filter method {other}"
            ))),
        }
    }
}

/// File key plus the crypt filter selection shared by both handlers.
struct CryptState {
    key: Vec<u8>,
    strf: CryptMethod,
    stmf: CryptMethod,
    named: FxHashMap<Name, CryptMethod>,
    encrypt_metadata: bool,
}

impl CryptState {
    /// `V < 4` files always use RC4 and always encrypt metadata.
    fn legacy(key: Vec<u8>) -> Self {
        Self {
            key,
            strf: CryptMethod::Rc4,
            stmf: CryptMethod::Rc4,
            named: FxHashMap::default(),
            encrypt_metadata: true,
        }
    }

    fn with_crypt_filters(key: Vec<u8>, encrypt: &Dictionary) -> Result<Self> {
        let mut named = FxHashMap::default();
        if let Some(cf) = encrypt.get("CF").and_then(|v| v.as_dict().ok()) {
            for (name, filter) in cf {
                let cfm = filter
                    .as_dict()
                    .ok()
                    .and_then(|f| f.get_name("CFM"))
                    .unwrap_or("None");
                named.insert(name.clone(), CryptMethod::from_cfm(cfm)?);
            }
        }
        let lookup = |key: &str| -> Result<CryptMethod> {
            match encrypt.get_name(key).unwrap_or("Identity") {
                "Identity" => Ok(CryptMethod::Identity),
                name => named.get(name).copied().ok_or_else(|| {
                    PdfError::UnsupportedEncryption(format!("crypt filter {name} not in CF"))
                }),
            }
        };
        let strf = lookup("StrF")?;
        let stmf = lookup("StmF")?;
        Ok(Self {
            key,
            strf,
            stmf,
            named,
            encrypt_metadata: encrypts_metadata(encrypt),
        })
    }

    fn stream_method(&self, dict: &Dictionary) -> CryptMethod {
        if dict.is_type("XRef") {
            return CryptMethod::Identity;
        }
        if !self.encrypt_metadata && dict.is_type("Metadata") {
            return CryptMethod::Identity;
        }
        let chain = FilterChain::from_dict(dict, |o| o.clone());
        if let Some(first) = chain.stages().first()
            && first.kind() == Some(FilterKind::Crypt)
        {
            let name = first
                .parms
                .as_ref()
                .and_then(|p| p.get_name("Name"))
                .unwrap_or("Identity");
            if name == "Identity" {
                return CryptMethod::Identity;
            }
            return self.named.get(name).copied().unwrap_or(self.stmf);
        }
        self.stmf
    }

    fn decrypt(&self, method: CryptMethod, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(Arcfour::apply(&object_key(&self.key, reference, false), data)),
            CryptMethod::AesV2 => aes_decrypt(&object_key(&self.key, reference, true), data),
            CryptMethod::AesV3 => aes_decrypt(&self.key, data),
        }
    }

    fn encrypt(&self, method: CryptMethod, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(Arcfour::apply(&object_key(&self.key, reference, false), data)),
            CryptMethod::AesV2 => {
                let key = object_key(&self.key, reference, true);
                let mut ctx = md5::Context::new();
                ctx.consume(&key);
                ctx.consume(data);
                let iv = ctx.finalize().0;
                aes_encrypt(&key, &iv, data)
            }
            CryptMethod::AesV3 => {
                let mut hasher = Sha256::new();
                hasher.update(&self.key);
                hasher.update(reference.number.to_le_bytes());
                hasher.update(reference.generation.to_le_bytes());
                hasher.update(data);
                let digest = hasher.finalize();
                aes_encrypt(&self.key, &digest[..16], data)
            }
        }
    }
}

fn encrypts_metadata(encrypt: &Dictionary) -> bool {
    encrypt
        .get("EncryptMetadata")
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(true)
}

/// Per-object key: md5(key, num[0..3], gen[0..2], "sAlT" for AES),
/// truncated to `min(n + 5, 16)` bytes.
pub fn object_key(key: &[u8], reference: ObjRef, aes: bool) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(key);
    ctx.consume(&reference.number.to_le_bytes()[..3]);
    ctx.consume(reference.generation.to_le_bytes());
    if aes {
        ctx.consume(b"sAlT");
    }
    let digest = ctx.finalize();
    digest.0[..(key.len() + 5).min(16)].to_vec()
}

/// IV-prefixed AES-CBC payload; PKCS#7 padding is removed when valid.
fn aes_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 {
        tracing::warn!(len = data.len(), "AES payload shorter than its IV");
        return Ok(Vec::new());
    }
    let (iv, ciphertext) = data.split_at(16);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    let plaintext = aes_cbc_decrypt(key, iv, ciphertext)?;
    Ok(unpad_aes(&plaintext).to_vec())
}

fn aes_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut out = iv.to_vec();
    out.extend(aes_cbc_encrypt(key, iv, data, true)?);
    Ok(out)
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn required_int(encrypt: &Dictionary, key: &str) -> Result<i64> {
    encrypt
        .get_i64(key)
        .ok_or_else(|| PdfError::UnsupportedEncryption(format!("missing {key} in Encrypt")))
}

fn required_bytes(encrypt: &Dictionary, key: &str) -> Result<Vec<u8>> {
    encrypt
        .get(key)
        .and_then(|v| v.as_bytes().ok())
        .map(<[u8]>::to_vec)
        .ok_or_else(|| PdfError::UnsupportedEncryption(format!("missing {key} in Encrypt")))
}

/// RC4 and AES-128 handler (`R` 2, 3 and 4).
pub struct StandardSecurityHandler {
    revision: i64,
    key_len: usize,
    o: Vec<u8>,
    u: Vec<u8>,
    p: u32,
    docid: Vec<u8>,
    encrypt_metadata: bool,
    state: CryptState,
}

impl StandardSecurityHandler {
    pub const SUPPORTED_REVISIONS: [i64; 3] = [2, 3, 4];

    /// Authenticate `password` as user, then owner password.
    pub fn new(encrypt: &Dictionary, docid: Option<&[u8]>, password: &str) -> Result<Self> {
        let revision = required_int(encrypt, "R")?;
        if !Self::SUPPORTED_REVISIONS.contains(&revision) {
            return Err(PdfError::UnsupportedEncryption(format!(
                "standard handler revision {revision}"
            )));
        }
        let key_len = if revision == 2 {
            5
        } else {
            let default = if revision == 4 { 128 } else { 40 };
            let bits = encrypt.get_i64("Length").unwrap_or(default).clamp(40, 128);
            (bits / 8) as usize
        };
        let mut handler = Self {
            revision,
            key_len,
            o: required_bytes(encrypt, "O")?,
            u: required_bytes(encrypt, "U")?,
            // P may be written signed or unsigned
            p: required_int(encrypt, "P")? as u32,
            docid: docid.map(<[u8]>::to_vec).unwrap_or_default(),
            encrypt_metadata: revision < 4 || encrypts_metadata(encrypt),
            state: CryptState::legacy(Vec::new()),
        };

        let password = password.as_bytes();
        let key = handler
            .authenticate_user(password)
            .or_else(|| handler.authenticate_owner(password))
            .ok_or(PdfError::AuthenticationFailure)?;

        handler.state = if revision == 4 {
            CryptState::with_crypt_filters(key, encrypt)?
        } else {
            CryptState::legacy(key)
        };
        Ok(handler)
    }

    /// File key from a user password (Algorithm 2).
    fn compute_key(&self, password: &[u8]) -> Vec<u8> {
        let mut ctx = md5::Context::new();
        ctx.consume(pad_password(password));
        ctx.consume(&self.o);
        ctx.consume(self.p.to_le_bytes());
        ctx.consume(&self.docid);
        if self.revision >= 4 && !self.encrypt_metadata {
            ctx.consume([0xFF, 0xFF, 0xFF, 0xFF]);
        }
        let mut hash = ctx.finalize().0.to_vec();
        let n = self.key_len;
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash[..n]).0.to_vec();
            }
        }
        hash.truncate(n);
        hash
    }

    /// Expected U entry for a file key (Algorithms 4 and 5).
    fn compute_u(&self, key: &[u8]) -> Vec<u8> {
        if self.revision == 2 {
            return Arcfour::apply(key, &PASSWORD_PADDING);
        }
        let mut ctx = md5::Context::new();
        ctx.consume(PASSWORD_PADDING);
        ctx.consume(&self.docid);
        let mut result = Arcfour::apply(key, &ctx.finalize().0);
        for i in 1..20u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            result = Arcfour::apply(&round_key, &result);
        }
        result
    }

    fn authenticate_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.compute_key(password);
        let u = self.compute_u(&key);
        let matches = if self.revision == 2 {
            u == self.u
        } else {
            self.u.len() >= 16 && u[..16] == self.u[..16]
        };
        matches.then_some(key)
    }

    /// Recover the user password from O and authenticate it (Algorithm 7).
    fn authenticate_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let mut hash = md5::compute(pad_password(password)).0.to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash).0.to_vec();
            }
        }
        let key = &hash[..self.key_len];
        let user_password = if self.revision == 2 {
            Arcfour::apply(key, &self.o)
        } else {
            let mut result = self.o.clone();
            for i in (0..20u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                result = Arcfour::apply(&round_key, &result);
            }
            result
        };
        self.authenticate_user(&user_password)
    }
}

impl SecurityHandler for StandardSecurityHandler {
    fn revision(&self) -> i64 {
        self.revision
    }

    fn encrypts_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    fn decrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.state.decrypt(self.state.strf, reference, data)
    }

    fn decrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>> {
        self.state.decrypt(self.state.stream_method(dict), reference, data)
    }

    fn encrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.state.encrypt(self.state.strf, reference, data)
    }

    fn encrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>> {
        self.state.encrypt(self.state.stream_method(dict), reference, data)
    }
}

/// AES-256 handler (`R` 5 and 6).
pub struct Aes256SecurityHandler {
    revision: i64,
    state: CryptState,
}

/// Split O or U into (hash, validation salt, key salt).
fn split_hash(value: &[u8], key: &str) -> Result<([u8; 32], [u8; 8], [u8; 8])> {
    if value.len() < 48 {
        return Err(PdfError::UnsupportedEncryption(format!(
            "{key} is {} bytes, expected 48",
            value.len()
        )));
    }
    let mut hash = [0u8; 32];
    let mut validation = [0u8; 8];
    let mut key_salt = [0u8; 8];
    hash.copy_from_slice(&value[..32]);
    validation.copy_from_slice(&value[32..40]);
    key_salt.copy_from_slice(&value[40..48]);
    Ok((hash, validation, key_salt))
}

impl Aes256SecurityHandler {
    pub const SUPPORTED_REVISIONS: [i64; 2] = [5, 6];

    /// Authenticate `password` as owner, then user password.
    pub fn new(encrypt: &Dictionary, password: &str) -> Result<Self> {
        let revision = required_int(encrypt, "R")?;
        if !Self::SUPPORTED_REVISIONS.contains(&revision) {
            return Err(PdfError::UnsupportedEncryption(format!(
                "AES-256 handler revision {revision}"
            )));
        }
        let o = required_bytes(encrypt, "O")?;
        let u = required_bytes(encrypt, "U")?;
        let oe = required_bytes(encrypt, "OE")?;
        let ue = required_bytes(encrypt, "UE")?;
        if oe.len() < 32 || ue.len() < 32 {
            return Err(PdfError::UnsupportedEncryption("OE/UE shorter than 32 bytes".into()));
        }
        let (o_hash, o_valid, o_key) = split_hash(&o, "O")?;
        let (u_hash, u_valid, u_key) = split_hash(&u, "U")?;
        let u48 = &u[..48];

        let pw = &password.as_bytes()[..password.len().min(127)];
        let key = if password_hash(revision, pw, &o_valid, Some(u48)) == o_hash {
            let intermediate = password_hash(revision, pw, &o_key, Some(u48));
            aes_cbc_decrypt(&intermediate, &[0u8; 16], &oe[..32])?
        } else if password_hash(revision, pw, &u_valid, None) == u_hash {
            let intermediate = password_hash(revision, pw, &u_key, None);
            aes_cbc_decrypt(&intermediate, &[0u8; 16], &ue[..32])?
        } else {
            return Err(PdfError::AuthenticationFailure);
        };

        Ok(Self {
            revision,
            state: CryptState::with_crypt_filters(key, encrypt)?,
        })
    }
}

/// Password hash: SHA-256 for R5, the iterated hash (Algorithm 2.B) for R6.
fn password_hash(revision: i64, password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> [u8; 32] {
    let vector = vector.unwrap_or(&[]);
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(vector);
    let mut k = hasher.finalize().to_vec();

    if revision >= 6 {
        let mut round = 0u32;
        loop {
            let mut k1 = Vec::with_capacity((password.len() + k.len() + vector.len()) * 64);
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                k1.extend_from_slice(vector);
            }
            // k1 is a multiple of 64 bytes so no padding is needed
            let Ok(e) = aes_cbc_encrypt(&k[..16], &k[16..32], &k1, false) else {
                break;
            };
            let selector = e[..16].iter().map(|&b| u32::from(b) % 3).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };
            round += 1;
            let last = e.last().copied().unwrap_or(0);
            if round >= 64 && u32::from(last) <= round - 32 {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

impl SecurityHandler for Aes256SecurityHandler {
    fn revision(&self) -> i64 {
        self.revision
    }

    fn encrypts_metadata(&self) -> bool {
        self.state.encrypt_metadata
    }

    fn decrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.state.decrypt(self.state.strf, reference, data)
    }

    fn decrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>> {
        self.state.decrypt(self.state.stream_method(dict), reference, data)
    }

    fn encrypt_string(&self, reference: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.state.encrypt(self.state.strf, reference, data)
    }

    fn encrypt_stream(&self, reference: ObjRef, data: &[u8], dict: &Dictionary) -> Result<Vec<u8>> {
        self.state.encrypt(self.state.stream_method(dict), reference, data)
    }
}

/// Build the handler for an `Encrypt` dictionary.
///
/// `docid` is the first element of the trailer `ID`. A `None` password
/// tries the empty user password.
pub fn create_security_handler(
    encrypt: &Dictionary,
    docid: Option<&[u8]>,
    password: Option<&str>,
) -> Result<Box<dyn SecurityHandler>> {
    let filter = encrypt.get_name("Filter").unwrap_or("");
    if filter != "Standard" {
        return Err(PdfError::UnsupportedEncryption(format!(
            "security handler {filter:?}"
        )));
    }
    let password = password.unwrap_or("");
    let v = encrypt.get_i64("V").unwrap_or(0);
    let r = required_int(encrypt, "R")?;
    tracing::debug!(v, r, "creating standard security handler");

    match (v, r) {
        (1 | 2, 2 | 3) | (4, 4) => Ok(Box::new(StandardSecurityHandler::new(
            encrypt, docid, password,
        )?)),
        (5, 5 | 6) => Ok(Box::new(Aes256SecurityHandler::new(encrypt, password)?)),
        _ => Err(PdfError::UnsupportedEncryption(format!("V={v}, R={r}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_length_is_capped() {
        let key = object_key(&[0u8; 16], ObjRef::new(1, 0), false);
        assert_eq!(key.len(), 16);
        let key = object_key(&[0u8; 5], ObjRef::new(1, 0), false);
        assert_eq!(key.len(), 10);
    }

    #[test]
    fn aes_v2_state_round_trips() {
        let state = CryptState {
            key: vec![7u8; 16],
            strf: CryptMethod::AesV2,
            stmf: CryptMethod::AesV2,
            named: FxHashMap::default(),
            encrypt_metadata: true,
        };
        let r = ObjRef::new(12, 0);
        let ciphertext = state.encrypt(CryptMethod::AesV2, r, b"hello world").unwrap();
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(state.decrypt(CryptMethod::AesV2, r, &ciphertext).unwrap(), b"hello world");
        // deterministic IV
        assert_eq!(state.encrypt(CryptMethod::AesV2, r, b"hello world").unwrap(), ciphertext);
    }

    #[test]
    fn short_aes_payload_decrypts_to_nothing() {
        let state = CryptState {
            key: vec![7u8; 32],
            strf: CryptMethod::AesV3,
            stmf: CryptMethod::AesV3,
            named: FxHashMap::default(),
            encrypt_metadata: true,
        };
        let r = ObjRef::new(3, 0);
        assert!(state.decrypt(CryptMethod::AesV3, r, b"truncated").unwrap().is_empty());
        assert!(state.decrypt(CryptMethod::AesV2, r, &[0u8; 15]).unwrap().is_empty());
    }

    #[test]
    fn identity_crypt_filter_skips_stream() {
        let state = CryptState {
            key: vec![1u8; 16],
            strf: CryptMethod::Rc4,
            stmf: CryptMethod::Rc4,
            named: FxHashMap::default(),
            encrypt_metadata: false,
        };
        let mut dict = Dictionary::new();
        dict.insert("Filter", vec![crate::model::PdfObject::name("Crypt")]);
        assert_eq!(state.stream_method(&dict), CryptMethod::Identity);

        let mut meta = Dictionary::new();
        meta.insert("Type", crate::model::PdfObject::name("Metadata"));
        assert_eq!(state.stream_method(&meta), CryptMethod::Identity);
        assert_eq!(state.stream_method(&Dictionary::new()), CryptMethod::Rc4);
    }

    #[test]
    fn r6_hash_is_stable() {
        let a = password_hash(6, b"pw", &[1u8; 8], None);
        let b = password_hash(6, b"pw", &[1u8; 8], None);
        assert_eq!(a, b);
        assert_ne!(a, password_hash(5, b"pw", &[1u8; 8], None));
    }
}
