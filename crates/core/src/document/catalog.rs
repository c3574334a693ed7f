//! PDF Document - owns the byte source and resolves objects on demand.
//!
//! Handles:
//! - locating and merging cross-reference sections (with rebuild fallback)
//! - lazy object loading through an LRU cache
//! - object streams
//! - decryption
//! - pending edits for incremental saves

use super::objstm::ObjectStream;
use super::repair;
use super::security::{SecurityHandler, create_security_handler};
use super::xref::{XrefEntry, XrefTable, find_header, find_startxref, load_chain};
use crate::api::options::OpenOptions;
use crate::codec::filters::FilterChain;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, Name, ObjRef, PdfObject, PdfStream, PdfString};
use crate::parser::pdf_parser::{ObjectLocator, parse_indirect_object_with};
use crate::writer::incremental::write_revision;
use bytes::Bytes;
use indexmap::IndexMap;
use memmap2::Mmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Longest `R -> R -> ...` chain followed by [`Document::resolve`].
const MAX_REFERENCE_CHAIN: usize = 32;

struct ObjectCache {
    capacity: usize,
    map: IndexMap<ObjRef, Arc<PdfObject>>,
}

impl ObjectCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: IndexMap::new(),
        }
    }

    fn get(&mut self, reference: ObjRef) -> Option<Arc<PdfObject>> {
        if self.capacity == 0 {
            return None;
        }
        let index = self.map.get_index_of(&reference)?;
        let value = Arc::clone(self.map.get_index(index)?.1);
        if index + 1 != self.map.len() {
            self.map.move_index(index, self.map.len() - 1);
        }
        Some(value)
    }

    fn insert(&mut self, reference: ObjRef, value: Arc<PdfObject>) {
        if self.capacity == 0 {
            return;
        }
        if self.map.contains_key(&reference) {
            self.map.shift_remove(&reference);
        }
        self.map.insert(reference, value);
        if self.map.len() > self.capacity {
            self.map.shift_remove_index(0);
        }
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Where the document bytes live.
#[derive(Clone)]
pub enum PdfBytes {
    Owned(Bytes),
    Shared(Bytes),
    Mapped(Bytes),
}

impl PdfBytes {
    const fn as_bytes(&self) -> &Bytes {
        match self {
            Self::Owned(data) | Self::Shared(data) | Self::Mapped(data) => data,
        }
    }

    fn as_slice(&self) -> &[u8] {
        self.as_bytes().as_ref()
    }

    pub const fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

/// Why the security handler could not be set up. Kept so the error can be
/// reported again on every decrypting access.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SecurityFailure {
    Authentication,
    Unsupported(String),
}

impl SecurityFailure {
    fn from_error(err: &PdfError) -> Self {
        match err {
            PdfError::AuthenticationFailure => Self::Authentication,
            PdfError::UnsupportedEncryption(msg) => Self::Unsupported(msg.clone()),
            other => Self::Unsupported(other.to_string()),
        }
    }

    fn to_error(&self) -> PdfError {
        match self {
            Self::Authentication => PdfError::AuthenticationFailure,
            Self::Unsupported(msg) => PdfError::UnsupportedEncryption(msg.clone()),
        }
    }
}

/// A pending change to one object number.
#[derive(Debug, Clone)]
pub(crate) enum Edit {
    Set(ObjRef, Arc<PdfObject>),
    Delete(ObjRef),
}

impl Edit {
    pub(crate) const fn reference(&self) -> ObjRef {
        match self {
            Self::Set(reference, _) | Self::Delete(reference) => *reference,
        }
    }
}

/// Removes a reference from the resolving set when dropped.
struct ResolveGuard<'a> {
    set: &'a RefCell<FxHashSet<ObjRef>>,
    reference: ObjRef,
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.reference);
    }
}

/// An opened PDF file.
///
/// Objects are parsed on first access and cached. The document is `Send`
/// but not `Sync`; share it between threads behind a lock.
pub struct Document {
    data: PdfBytes,
    /// Position of `%PDF-`; xref offsets are relative to it.
    base: usize,
    version: Option<String>,
    xref: XrefTable,
    trailer: Dictionary,
    /// Every loaded trailer, newest first.
    trailers: Vec<Dictionary>,
    recovered: bool,
    /// Offset of the newest xref section (relative to `base`).
    startxref: Option<usize>,
    handler: Option<Box<dyn SecurityHandler>>,
    security_failure: Option<SecurityFailure>,
    encrypt_ref: Option<ObjRef>,
    options: OpenOptions,
    cache: RefCell<ObjectCache>,
    object_streams: RefCell<FxHashMap<u32, Arc<ObjectStream>>>,
    unreadable: RefCell<BTreeSet<ObjRef>>,
    resolving: RefCell<FxHashSet<ObjRef>>,
    edits: BTreeMap<u32, Edit>,
    trailer_edits: Dictionary,
    next_number: u32,
}

impl Document {
    /// Memory-map and open the file at `path`.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only and owned by the document's bytes.
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::open_source(PdfBytes::Mapped(Bytes::from_owner(mmap)), options.clone())
    }

    /// Open a document from shared bytes without copying.
    pub fn from_bytes(data: Bytes, options: &OpenOptions) -> Result<Self> {
        Self::open_source(PdfBytes::Shared(data), options.clone())
    }

    /// Open a document from a copy of `data`.
    pub fn new<D: AsRef<[u8]>>(data: D, password: &str) -> Result<Self> {
        let options = OpenOptions::default().password(password);
        Self::open_source(
            PdfBytes::Owned(Bytes::copy_from_slice(data.as_ref())),
            options,
        )
    }

    /// Release the byte source, including any memory map.
    pub fn close(self) {}

    fn open_source(data: PdfBytes, options: OpenOptions) -> Result<Self> {
        options.check_cancelled()?;
        let source = data.as_bytes().clone();

        let (base, version) = match find_header(&source) {
            Some((base, version)) => {
                if base > 0 {
                    tracing::warn!(base, "garbage before %PDF- header");
                }
                (base, Some(version))
            }
            None => {
                tracing::warn!("no %PDF- header, assuming offsets start at 0");
                (0, None)
            }
        };

        let mut doc = Self {
            data,
            base,
            version,
            xref: XrefTable::new(),
            trailer: Dictionary::new(),
            trailers: Vec::new(),
            recovered: false,
            startxref: None,
            handler: None,
            security_failure: None,
            encrypt_ref: None,
            cache: RefCell::new(ObjectCache::new(options.cache_capacity)),
            object_streams: RefCell::new(FxHashMap::default()),
            unreadable: RefCell::new(BTreeSet::new()),
            resolving: RefCell::new(FxHashSet::default()),
            edits: BTreeMap::new(),
            trailer_edits: Dictionary::new(),
            next_number: 1,
            options,
        };

        let chain = find_startxref(&source, doc.options.startxref_window).and_then(|offset| {
            doc.startxref = Some(offset);
            load_chain(&source, base, offset, &doc.options)
        });
        let mut pending_streams = Vec::new();
        match chain {
            Ok(chain) => {
                doc.xref = chain.table;
                doc.trailers = chain.trailers;
                doc.trailer = doc.trailers.first().cloned().unwrap_or_default();
                doc.setup_security();
                if !doc.root_resolves() {
                    tracing::warn!("trailer Root does not resolve, rebuilding");
                    pending_streams = doc.apply_rebuild(&source)?;
                }
            }
            Err(PdfError::Cancelled) => return Err(PdfError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "cross-reference chain unusable, rebuilding");
                pending_streams = doc.apply_rebuild(&source)?;
            }
        }

        if doc.recovered {
            doc.index_object_streams(&pending_streams)?;
            if !doc.root_resolves() {
                return Err(PdfError::DocumentUnreadable(
                    "catalog unreachable after rebuild".into(),
                ));
            }
        }

        doc.clear_caches();
        doc.next_number = doc.first_unused_number();
        tracing::debug!(
            objects = doc.xref.object_count(),
            recovered = doc.recovered,
            encrypted = doc.is_encrypted(),
            "opened document"
        );
        Ok(doc)
    }

    fn apply_rebuild(&mut self, source: &Bytes) -> Result<Vec<u32>> {
        let rebuilt = repair::rebuild(source, self.base, &self.options)?;
        self.xref = rebuilt.table;
        self.trailer = rebuilt.trailer;
        self.trailers = vec![self.trailer.clone()];
        self.recovered = true;
        self.clear_caches();
        self.setup_security();
        Ok(rebuilt.object_streams)
    }

    fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
        self.object_streams.borrow_mut().clear();
        self.unreadable.borrow_mut().clear();
    }

    fn first_unused_number(&self) -> u32 {
        let size = self
            .trailer
            .get_i64("Size")
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        size.max(self.xref.max_object_number() + 1).max(1)
    }

    /// Objects of object streams found by a rebuild that were not seen in the file.
    fn index_object_streams(&mut self, streams: &[u32]) -> Result<()> {
        for &number in streams {
            self.options.check_cancelled()?;
            let objstm = match self.object_stream(number) {
                Ok(objstm) => objstm,
                Err(err) => {
                    tracing::warn!(number, error = %err, "object stream unreadable during rebuild");
                    continue;
                }
            };
            for (index, member) in objstm.numbers().enumerate() {
                self.xref.insert_if_absent(
                    member,
                    XrefEntry::InObjectStream {
                        stream: number,
                        index: index as u32,
                    },
                );
            }
        }
        Ok(())
    }

    fn root_resolves(&self) -> bool {
        let Some(root) = self.trailer.get("Root").and_then(|r| r.as_reference().ok()) else {
            return false;
        };
        if self.security_failure.is_some() {
            return self.xref.get(root.number).is_some_and(|e| !e.is_free());
        }
        matches!(
            self.load(root, true).as_deref(),
            Ok(PdfObject::Dictionary(_))
        )
    }

    fn setup_security(&mut self) {
        self.handler = None;
        self.security_failure = None;
        self.encrypt_ref = None;

        let encrypt = match self.trailer.get("Encrypt") {
            None | Some(PdfObject::Null) => return,
            Some(PdfObject::Reference(reference)) => {
                let reference = *reference;
                self.encrypt_ref = Some(reference);
                match self.load(reference, false).as_deref() {
                    Ok(PdfObject::Dictionary(dict)) => dict.clone(),
                    Ok(other) => {
                        self.fail_security(PdfError::UnsupportedEncryption(format!(
                            "Encrypt is a {}",
                            other.type_name()
                        )));
                        return;
                    }
                    Err(err) => {
                        self.fail_security(PdfError::UnsupportedEncryption(format!(
                            "Encrypt dictionary unreadable: {err}"
                        )));
                        return;
                    }
                }
            }
            Some(PdfObject::Dictionary(dict)) => dict.clone(),
            Some(other) => {
                let msg = format!("Encrypt is a {}", other.type_name());
                self.fail_security(PdfError::UnsupportedEncryption(msg));
                return;
            }
        };

        let docid = self
            .trailer
            .get("ID")
            .and_then(|id| id.as_array().ok())
            .and_then(|id| id.first())
            .and_then(|first| first.as_bytes().ok())
            .map(<[u8]>::to_vec);
        match create_security_handler(&encrypt, docid.as_deref(), self.options.password.as_deref()) {
            Ok(handler) => self.handler = Some(handler),
            Err(err) => self.fail_security(err),
        }
    }

    fn fail_security(&mut self, err: PdfError) {
        tracing::warn!(error = %err, "document cannot be decrypted");
        self.security_failure = Some(SecurityFailure::from_error(&err));
    }

    /// Get an object by reference.
    ///
    /// Free, missing and generation-mismatched references resolve to
    /// `Null`. Strings are decrypted; stream payloads stay encoded until
    /// [`decode_stream`](Self::decode_stream).
    pub fn get_object(&self, reference: ObjRef) -> Result<Arc<PdfObject>> {
        if let Some(failure) = &self.security_failure {
            return Err(failure.to_error());
        }
        self.load(reference, true)
    }

    /// Get an object without decrypting its strings. Works on documents
    /// whose password was rejected.
    pub fn get_object_raw(&self, reference: ObjRef) -> Result<Arc<PdfObject>> {
        self.load(reference, false)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, obj: &PdfObject) -> Result<Arc<PdfObject>> {
        let PdfObject::Reference(first) = obj else {
            return Ok(Arc::new(obj.clone()));
        };
        let mut reference = *first;
        for _ in 0..MAX_REFERENCE_CHAIN {
            let target = self.get_object(reference)?;
            match target.as_ref() {
                PdfObject::Reference(next) => reference = *next,
                _ => return Ok(target),
            }
        }
        Err(PdfError::parse(
            0,
            format!("reference chain through {reference} is too long"),
        ))
    }

    /// [`resolve`](Self::resolve) that maps failures to `Null`.
    fn resolve_or_null(&self, obj: &PdfObject) -> PdfObject {
        match self.resolve(obj) {
            Ok(resolved) => resolved.as_ref().clone(),
            Err(_) => PdfObject::Null,
        }
    }

    fn load(&self, reference: ObjRef, decrypt: bool) -> Result<Arc<PdfObject>> {
        if let Some(edit) = self.edits.get(&reference.number) {
            return Ok(match edit {
                Edit::Set(edited, obj) if *edited == reference => Arc::clone(obj),
                _ => Arc::new(PdfObject::Null),
            });
        }
        if decrypt && let Some(obj) = self.cache.borrow_mut().get(reference) {
            tracing::trace!(%reference, "cache hit");
            return Ok(obj);
        }

        if !self.resolving.borrow_mut().insert(reference) {
            return Err(PdfError::parse(
                0,
                format!("circular reference through {reference}"),
            ));
        }
        let _guard = ResolveGuard {
            set: &self.resolving,
            reference,
        };

        match self.read_object(reference, decrypt) {
            Ok(obj) => {
                let obj = Arc::new(obj);
                if decrypt {
                    self.cache.borrow_mut().insert(reference, Arc::clone(&obj));
                }
                Ok(obj)
            }
            Err(PdfError::Cancelled) => Err(PdfError::Cancelled),
            Err(err) => {
                tracing::warn!(%reference, error = %err, "object unreadable");
                self.unreadable.borrow_mut().insert(reference);
                Err(err)
            }
        }
    }

    fn read_object(&self, reference: ObjRef, decrypt: bool) -> Result<PdfObject> {
        let Some(entry) = self.xref.get(reference.number).copied() else {
            tracing::trace!(%reference, "dangling reference");
            return Ok(PdfObject::Null);
        };
        tracing::trace!(%reference, ?entry, "loading object");
        match entry {
            XrefEntry::Free { .. } => Ok(PdfObject::Null),
            XrefEntry::InFile { offset, generation } => {
                if generation != reference.generation {
                    return Ok(PdfObject::Null);
                }
                let at = self.base + offset;
                let (found, mut obj) = parse_indirect_object_with(
                    self.data.as_bytes(),
                    at,
                    self,
                    self.options.max_nesting,
                )?;
                if found.number != reference.number {
                    return Err(PdfError::parse(
                        at,
                        format!("expected object {reference}, found {found}"),
                    ));
                }
                if self.is_encrypted() && Some(reference) != self.encrypt_ref {
                    if decrypt && let Some(handler) = &self.handler {
                        obj = decrypt_strings(handler.as_ref(), reference, obj)?;
                    }
                    if let PdfObject::Stream(stream) = &mut obj
                        && !stream.dict.is_type("XRef")
                    {
                        stream.set_encrypted(true);
                    }
                }
                Ok(obj)
            }
            XrefEntry::InObjectStream { stream, index } => {
                if reference.generation != 0 {
                    return Ok(PdfObject::Null);
                }
                let objstm = self.object_stream(stream)?;
                let (number, obj) = objstm.object_at(index as usize, self.options.max_nesting)?;
                if number == reference.number {
                    return Ok(obj);
                }
                match objstm.index_of(reference.number) {
                    Some(actual) => {
                        tracing::warn!(%reference, index, actual, "object stream index mismatch");
                        Ok(objstm.object_at(actual, self.options.max_nesting)?.1)
                    }
                    None => Err(PdfError::parse(
                        0,
                        format!("object {reference} not in object stream {stream}"),
                    )),
                }
            }
        }
    }

    fn object_stream(&self, number: u32) -> Result<Arc<ObjectStream>> {
        if let Some(objstm) = self.object_streams.borrow().get(&number) {
            return Ok(Arc::clone(objstm));
        }
        let generation = self.xref.get(number).map_or(0, XrefEntry::generation);
        let container = self.load(ObjRef::new(number, generation), true)?;
        let stream = container.as_stream()?;
        if !stream.dict.is_type("ObjStm") {
            return Err(PdfError::parse(
                0,
                format!("object {number} is not an object stream"),
            ));
        }
        let data = self.decode_stream(stream)?;
        let objstm = Arc::new(ObjectStream::parse(&stream.dict, data)?);
        tracing::debug!(number, objects = objstm.len(), "decoded object stream");
        self.object_streams
            .borrow_mut()
            .insert(number, Arc::clone(&objstm));
        Ok(objstm)
    }

    /// Decrypt (if needed) and run the stream's filter chain.
    pub fn decode_stream(&self, stream: &PdfStream) -> Result<Vec<u8>> {
        let mut payload = Cow::Borrowed(stream.raw());
        if stream.is_encrypted() {
            if let Some(failure) = &self.security_failure {
                return Err(failure.to_error());
            }
            if let (Some(handler), Some(origin)) = (&self.handler, stream.origin()) {
                payload = Cow::Owned(handler.decrypt_stream(origin, stream.raw(), &stream.dict)?);
            }
        }
        let chain = FilterChain::from_dict(&stream.dict, |o| self.resolve_or_null(o));
        Ok(chain.decode_with_limit(&payload, self.options.max_decoded_bytes)?)
    }

    /// The document catalog (`Root`).
    pub fn catalog(&self) -> Result<Dictionary> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| PdfError::DocumentUnreadable("trailer has no Root".into()))?;
        Ok(self.resolve(root)?.as_dict()?.clone())
    }

    /// The `Info` dictionary, if present.
    pub fn info(&self) -> Result<Option<Dictionary>> {
        let Some(info) = self.trailer.get("Info") else {
            return Ok(None);
        };
        match self.resolve(info)?.as_ref() {
            PdfObject::Dictionary(dict) => Ok(Some(dict.clone())),
            _ => Ok(None),
        }
    }

    /// Newest trailer.
    pub const fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// All trailers, newest first.
    pub fn trailers(&self) -> &[Dictionary] {
        &self.trailers
    }

    pub const fn xref(&self) -> &XrefTable {
        &self.xref
    }

    /// Header version (`1.7`, `2.0`, ...).
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Whether the object table came from a brute-force rebuild.
    pub const fn recovered(&self) -> bool {
        self.recovered
    }

    pub const fn startxref(&self) -> Option<usize> {
        self.startxref
    }

    pub const fn header_offset(&self) -> usize {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub const fn is_mapped(&self) -> bool {
        self.data.is_mapped()
    }

    /// Objects that failed to parse so far.
    pub fn unreadable_objects(&self) -> Vec<ObjRef> {
        self.unreadable.borrow().iter().copied().collect()
    }

    pub fn is_encrypted(&self) -> bool {
        self.handler.is_some() || self.security_failure.is_some()
    }

    /// The error every decrypting access fails with, if the document could
    /// not be decrypted.
    pub fn security_error(&self) -> Option<PdfError> {
        self.security_failure.as_ref().map(SecurityFailure::to_error)
    }

    pub(crate) fn security_handler(&self) -> Option<&dyn SecurityHandler> {
        self.handler.as_deref()
    }

    pub(crate) const fn encrypt_ref(&self) -> Option<ObjRef> {
        self.encrypt_ref
    }

    pub fn cached_objects(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Replace (or create) the object at `reference`.
    pub fn set_object(&mut self, reference: ObjRef, obj: impl Into<PdfObject>) {
        self.next_number = self.next_number.max(reference.number + 1);
        self.edits
            .insert(reference.number, Edit::Set(reference, Arc::new(obj.into())));
    }

    /// Add a new object under the next free number.
    pub fn add_object(&mut self, obj: impl Into<PdfObject>) -> ObjRef {
        let reference = ObjRef::new(self.next_number, 0);
        self.set_object(reference, obj);
        reference
    }

    /// Mark `reference` as free in the next revision.
    pub fn delete_object(&mut self, reference: ObjRef) {
        self.edits.insert(reference.number, Edit::Delete(reference));
    }

    /// Set a key in the trailer of the next revision.
    pub fn set_trailer_entry(&mut self, key: impl Into<Name>, value: impl Into<PdfObject>) {
        self.trailer_edits.insert(key, value);
    }

    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty() || !self.trailer_edits.is_empty()
    }

    /// Changed, added and deleted objects, by number.
    pub fn dirty_objects(&self) -> Vec<ObjRef> {
        self.edits.values().map(Edit::reference).collect()
    }

    pub(crate) fn edit(&self, number: u32) -> Option<&Edit> {
        self.edits.get(&number)
    }

    pub(crate) const fn trailer_edits(&self) -> &Dictionary {
        &self.trailer_edits
    }

    /// Write the original bytes followed by a new revision holding the
    /// pending edits. Returns the new `startxref` value.
    pub fn save_incremental<W: Write>(&self, sink: &mut W) -> Result<usize> {
        let original = self.bytes();
        sink.write_all(original)?;
        let mut written = original.len();
        if !original.ends_with(b"\n") && !original.ends_with(b"\r") {
            sink.write_all(b"\n")?;
            written += 1;
        }
        write_revision(self, &self.dirty_objects(), sink, written)
    }
}

impl ObjectLocator for Document {
    fn stream_length(&self, reference: ObjRef) -> Option<i64> {
        self.load(reference, false).ok()?.as_i64().ok()
    }
}

/// Decrypt every string inside `obj`, including stream dictionaries.
fn decrypt_strings(
    handler: &dyn SecurityHandler,
    reference: ObjRef,
    obj: PdfObject,
) -> Result<PdfObject> {
    Ok(match obj {
        PdfObject::String(s) => PdfObject::String(PdfString {
            bytes: handler.decrypt_string(reference, &s.bytes)?,
            format: s.format,
        }),
        PdfObject::Array(items) => PdfObject::Array(
            items
                .into_iter()
                .map(|item| decrypt_strings(handler, reference, item))
                .collect::<Result<_>>()?,
        ),
        PdfObject::Dictionary(dict) => {
            PdfObject::Dictionary(decrypt_dict(handler, reference, dict)?)
        }
        PdfObject::Stream(mut stream) => {
            stream.dict = decrypt_dict(handler, reference, std::mem::take(&mut stream.dict))?;
            PdfObject::Stream(stream)
        }
        other => other,
    })
}

fn decrypt_dict(
    handler: &dyn SecurityHandler,
    reference: ObjRef,
    dict: Dictionary,
) -> Result<Dictionary> {
    dict.into_iter()
        .map(|(key, value)| Ok((key, decrypt_strings(handler, reference, value)?)))
        .collect()
}
