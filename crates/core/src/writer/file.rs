//! Writing a complete file from scratch.

use super::serialize::{write_indirect, write_object};
use crate::codec::flate::flateencode;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dictionary, Name, ObjRef, PdfObject, PdfStream};
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::Write;

/// Builds a single-revision PDF file.
///
/// Objects are numbered from 1 in the order they are added or reserved.
/// By default the cross-reference data is a classic `xref` table; call
/// [`FileWriter::xref_stream`] for a compressed cross-reference stream and
/// [`FileWriter::object_streams`] to pack plain objects into an object
/// stream.
///
/// # Example
/// ```ignore
/// let mut w = FileWriter::new("1.7");
/// let pages = w.reserve();
/// let catalog = w.add(dict);
/// w.set_root(catalog);
/// let bytes = w.to_bytes()?;
/// ```
#[derive(Debug, Clone)]
pub struct FileWriter {
    version: String,
    objects: BTreeMap<u32, (u16, PdfObject)>,
    trailer: Dictionary,
    next_number: u32,
    xref_stream: bool,
    object_streams: bool,
}

impl FileWriter {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            objects: BTreeMap::new(),
            trailer: Dictionary::new(),
            next_number: 1,
            xref_stream: false,
            object_streams: false,
        }
    }

    /// Use a cross-reference stream instead of an `xref` table.
    pub const fn xref_stream(mut self, enabled: bool) -> Self {
        self.xref_stream = enabled;
        self
    }

    /// Pack non-stream objects of generation 0 into one object stream.
    /// Implies a cross-reference stream.
    pub const fn object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        if enabled {
            self.xref_stream = true;
        }
        self
    }

    /// Allocate a number without an object yet.
    pub fn reserve(&mut self) -> ObjRef {
        let reference = ObjRef::new(self.next_number, 0);
        self.next_number += 1;
        reference
    }

    pub fn add(&mut self, obj: impl Into<PdfObject>) -> ObjRef {
        let reference = self.reserve();
        self.set(reference, obj);
        reference
    }

    /// Store `obj` under `reference`, replacing any earlier object.
    pub fn set(&mut self, reference: ObjRef, obj: impl Into<PdfObject>) {
        self.next_number = self.next_number.max(reference.number + 1);
        self.objects
            .insert(reference.number, (reference.generation, obj.into()));
    }

    pub fn set_root(&mut self, root: ObjRef) {
        self.trailer.insert("Root", root);
    }

    pub fn set_trailer_entry(&mut self, key: impl Into<Name>, value: impl Into<PdfObject>) {
        self.trailer.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Write the file; returns the `startxref` offset.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<usize> {
        if !self.trailer.contains_key("Root") {
            return Err(PdfError::parse(0, "file has no Root"));
        }
        let mut buf: Vec<u8> = Vec::new();
        writeln!(buf, "%PDF-{}", self.version)?;
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let startxref = if self.xref_stream {
            self.write_with_xref_stream(&mut buf)?
        } else {
            self.write_with_xref_table(&mut buf)?
        };
        out.write_all(&buf)?;
        Ok(startxref)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    fn size(&self) -> u32 {
        self.objects.keys().next_back().map_or(1, |n| n + 1)
    }

    fn write_with_xref_table(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut offsets = BTreeMap::new();
        for (&number, (generation, obj)) in &self.objects {
            offsets.insert(number, (buf.len(), *generation));
            write_indirect(ObjRef::new(number, *generation), obj, buf)?;
        }

        let size = self.size();
        let free: Vec<u32> = (1..size).filter(|n| !offsets.contains_key(n)).collect();
        let startxref = buf.len();
        write!(buf, "xref\n0 {size}\n")?;
        for number in 0..size {
            match offsets.get(&number) {
                Some(&(offset, generation)) => write!(buf, "{offset:010} {generation:05} n\r\n")?,
                None => {
                    let next = free.iter().find(|&&n| n > number).copied().unwrap_or(0);
                    let generation = if number == 0 { 65535 } else { 0 };
                    write!(buf, "{next:010} {generation:05} f\r\n")?;
                }
            }
        }

        let mut trailer = self.trailer.clone();
        trailer.insert("Size", size);
        buf.extend_from_slice(b"trailer\n");
        write_object(&PdfObject::Dictionary(trailer), buf)?;
        write!(buf, "\nstartxref\n{startxref}\n%%EOF\n")?;
        Ok(startxref)
    }

    fn write_with_xref_stream(&self, buf: &mut Vec<u8>) -> Result<usize> {
        // (type, field 2, field 3) per object number
        let mut rows: BTreeMap<u32, (u8, u32, u16)> = BTreeMap::new();
        let mut packed: Vec<(u32, &PdfObject)> = Vec::new();

        for (&number, (generation, obj)) in &self.objects {
            if self.object_streams && *generation == 0 && !matches!(obj, PdfObject::Stream(_)) {
                packed.push((number, obj));
                continue;
            }
            rows.insert(number, (1, offset_field(buf.len())?, *generation));
            write_indirect(ObjRef::new(number, *generation), obj, buf)?;
        }

        let mut next = self.size();
        if !packed.is_empty() {
            let stream_number = next;
            next += 1;
            let stream = pack_objects(&packed)?;
            rows.insert(stream_number, (1, offset_field(buf.len())?, 0));
            write_indirect(ObjRef::new(stream_number, 0), &PdfObject::from(stream), buf)?;
            for (index, (number, _)) in packed.iter().enumerate() {
                let index = u16::try_from(index)
                    .map_err(|_| PdfError::parse(0, "too many objects for one object stream"))?;
                rows.insert(*number, (2, stream_number, index));
            }
        }

        let xref_number = next;
        let size = xref_number + 1;
        let startxref = buf.len();
        rows.insert(xref_number, (1, offset_field(startxref)?, 0));

        let mut data = Vec::with_capacity(size as usize * 7);
        for number in 0..size {
            let (kind, field2, field3) = match rows.get(&number) {
                Some(row) => *row,
                None if number == 0 => (0, 0, 65535),
                None => (0, 0, 0),
            };
            data.write_u8(kind)?;
            data.write_u32::<BigEndian>(field2)?;
            data.write_u16::<BigEndian>(field3)?;
        }

        let mut dict = self.trailer.clone();
        dict.insert("Type", PdfObject::name("XRef"));
        dict.insert("Size", size);
        dict.insert(
            "W",
            vec![PdfObject::integer(1), PdfObject::integer(4), PdfObject::integer(2)],
        );
        dict.insert("Filter", PdfObject::name("FlateDecode"));
        let stream = PdfStream::new(dict, flateencode(&data)?);
        write_indirect(ObjRef::new(xref_number, 0), &PdfObject::from(stream), buf)?;
        write!(buf, "startxref\n{startxref}\n%%EOF\n")?;
        Ok(startxref)
    }
}

fn offset_field(offset: usize) -> Result<u32> {
    u32::try_from(offset).map_err(|_| PdfError::parse(offset, "offset does not fit a 4-byte xref field"))
}

/// Build a `Type ObjStm` stream holding `objects` in order.
fn pack_objects(objects: &[(u32, &PdfObject)]) -> Result<PdfStream> {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for (number, obj) in objects {
        write!(header, "{} {} ", number, body.len())?;
        write_object(obj, &mut body)?;
        body.push(b'\n');
    }
    let first = header.len();
    header.extend_from_slice(&body);

    let mut dict = Dictionary::new();
    dict.insert("Type", PdfObject::name("ObjStm"));
    dict.insert("N", objects.len() as i64);
    dict.insert("First", first as i64);
    dict.insert("Filter", PdfObject::name("FlateDecode"));
    Ok(PdfStream::new(dict, flateencode(&header)?))
}
