//! dumppdf - dump PDF structure as XML
//!
//! Prints objects, trailers or the outline tree of one or more files.
//! Streams are shown as their dictionary only, or followed by their
//! decoded data, or written out as raw or decoded bytes.

use clap::{ArgAction, ArgGroup, Parser};
use quire_core::document::XrefEntry;
use quire_core::error::Result;
use quire_core::{Document, ObjRef, OpenOptions, PdfObject};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Escape special characters for XML output.
fn escape(s: &[u8]) -> String {
    let mut result = String::with_capacity(s.len());
    for &byte in s {
        match byte {
            b'&' => result.push_str("&amp;"),
            b'<' => result.push_str("&lt;"),
            b'>' => result.push_str("&gt;"),
            b'"' => result.push_str("&quot;"),
            b'\'' => result.push_str("&#39;"),
            b'\\' => result.push_str("&#92;"),
            0..=31 | 127..=255 => result.push_str(&format!("&#{byte};")),
            _ => result.push(byte as char),
        }
    }
    result
}

fn escape_str(s: &str) -> String {
    escape(s.as_bytes())
}

/// How stream bodies are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCodec {
    /// Dictionary only.
    None,
    /// Bytes exactly as stored in the file.
    Raw,
    /// Decrypted and decoded bytes.
    Binary,
    /// Dictionary plus decoded bytes, escaped into the XML.
    Text,
}

fn dumpxml<W: Write>(out: &mut W, doc: &Document, obj: &PdfObject, codec: StreamCodec) -> Result<()> {
    match obj {
        PdfObject::Null => write!(out, "<null />")?,
        PdfObject::Boolean(b) => write!(out, "<boolean>{b}</boolean>")?,
        PdfObject::Number(n) if n.is_integer() => write!(out, "<number>{}</number>", n.as_i64())?,
        PdfObject::Number(n) => write!(out, "<number>{}</number>", n.as_f64())?,
        PdfObject::String(s) => {
            let bytes = s.as_bytes();
            write!(out, r#"<string size="{}">{}</string>"#, bytes.len(), escape(bytes))?;
        }
        PdfObject::Name(name) => write!(out, "<literal>{}</literal>", escape_str(name))?,
        PdfObject::Array(items) => {
            writeln!(out, r#"<list size="{}">"#, items.len())?;
            for item in items {
                dumpxml(out, doc, item, codec)?;
                writeln!(out)?;
            }
            write!(out, "</list>")?;
        }
        PdfObject::Dictionary(dict) => {
            writeln!(out, r#"<dict size="{}">"#, dict.len())?;
            for (k, v) in dict {
                writeln!(out, "<key>{}</key>", escape_str(k))?;
                write!(out, "<value>")?;
                dumpxml(out, doc, v, codec)?;
                writeln!(out, "</value>")?;
            }
            write!(out, "</dict>")?;
        }
        PdfObject::Stream(stream) => match codec {
            StreamCodec::Raw => out.write_all(stream.raw())?,
            StreamCodec::Binary => out.write_all(&doc.decode_stream(stream)?)?,
            StreamCodec::Text | StreamCodec::None => {
                writeln!(out, "<stream>")?;
                writeln!(out, "<props>")?;
                dumpxml(out, doc, &PdfObject::Dictionary(stream.dict.clone()), codec)?;
                writeln!(out)?;
                writeln!(out, "</props>")?;
                if codec == StreamCodec::Text {
                    match doc.decode_stream(stream) {
                        Ok(data) => {
                            writeln!(out, r#"<data size="{}">{}</data>"#, data.len(), escape(&data))?;
                        }
                        Err(e) => eprintln!("cannot decode stream: {e}"),
                    }
                }
                write!(out, "</stream>")?;
            }
        },
        PdfObject::Reference(r) => {
            write!(out, r#"<ref id="{}" gen="{}" />"#, r.number, r.generation)?;
        }
    }
    Ok(())
}

/// Dump every trailer, newest first.
fn dumptrailers<W: Write>(out: &mut W, doc: &Document) -> Result<()> {
    if doc.recovered() {
        eprintln!(
            "Warning: the cross-reference data of this file is damaged; \
             the trailer below was rebuilt by scanning the file."
        );
    }
    for trailer in doc.trailers() {
        writeln!(out, "<trailer>")?;
        dumpxml(out, doc, &PdfObject::Dictionary(trailer.clone()), StreamCodec::None)?;
        writeln!(out)?;
        writeln!(out, "</trailer>")?;
        writeln!(out)?;
    }
    Ok(())
}

fn dumpobject<W: Write>(out: &mut W, doc: &Document, reference: ObjRef, codec: StreamCodec) -> Result<()> {
    match doc.get_object(reference) {
        Ok(obj) => {
            if matches!(codec, StreamCodec::Raw | StreamCodec::Binary) {
                return dumpxml(out, doc, &obj, codec);
            }
            writeln!(
                out,
                r#"<object id="{}" gen="{}">"#,
                reference.number, reference.generation
            )?;
            dumpxml(out, doc, &obj, codec)?;
            writeln!(out)?;
            writeln!(out, "</object>")?;
            writeln!(out)?;
        }
        Err(e) => eprintln!("not readable: object {reference} - {e}"),
    }
    Ok(())
}

/// Dump every in-use object in the table, then the trailers.
fn dumpallobjs<W: Write>(out: &mut W, doc: &Document, codec: StreamCodec) -> Result<()> {
    write!(out, "<pdf>")?;
    for (number, entry) in doc.xref().iter() {
        if entry.is_free() {
            continue;
        }
        dumpobject(out, doc, ObjRef::new(number, entry.generation()), codec)?;
    }
    dumptrailers(out, doc)?;
    write!(out, "</pdf>")?;
    Ok(())
}

/// Page object numbers in document order, for outline destinations.
fn page_numbers(doc: &Document) -> HashMap<ObjRef, usize> {
    fn walk(doc: &Document, node: &PdfObject, pages: &mut HashMap<ObjRef, usize>, depth: usize) {
        let PdfObject::Reference(r) = node else {
            return;
        };
        if depth > 64 || pages.contains_key(r) {
            return;
        }
        let Ok(obj) = doc.get_object(*r) else {
            return;
        };
        let Ok(dict) = obj.as_dict() else {
            return;
        };
        match dict.get("Kids").map(|kids| doc.resolve(kids)) {
            Some(Ok(kids)) if !dict.is_type("Page") => {
                if let Ok(kids) = kids.as_array() {
                    for kid in kids {
                        walk(doc, kid, pages, depth + 1);
                    }
                }
            }
            _ => {
                let next = pages.len() + 1;
                pages.insert(*r, next);
            }
        }
    }

    let mut pages = HashMap::new();
    if let Ok(catalog) = doc.catalog()
        && let Some(root) = catalog.get("Pages")
    {
        walk(doc, root, &mut pages, 0);
    }
    pages
}

fn dumpoutline<W: Write>(out: &mut W, doc: &Document) -> Result<()> {
    let pages = page_numbers(doc);
    writeln!(out, "<outlines>")?;
    if let Some(outlines) = doc.catalog()?.get("Outlines")
        && let Ok(outlines) = doc.resolve(outlines)
        && let Ok(dict) = outlines.as_dict()
        && let Some(first) = dict.get("First")
    {
        dump_outline_item(out, doc, first, &pages, 0)?;
    }
    writeln!(out, "</outlines>")?;
    Ok(())
}

/// Dump an outline item, its children and its following siblings.
fn dump_outline_item<W: Write>(
    out: &mut W,
    doc: &Document,
    first: &PdfObject,
    pages: &HashMap<ObjRef, usize>,
    level: usize,
) -> Result<()> {
    let mut next = Some(first.clone());
    let mut seen = 0usize;
    while let Some(item_ref) = next.take() {
        seen += 1;
        if seen > 100_000 {
            break;
        }
        let item = doc.resolve(&item_ref)?;
        let Ok(dict) = item.as_dict() else {
            break;
        };

        let title = dict
            .get("Title")
            .and_then(|t| doc.resolve(t).ok())
            .and_then(|t| t.as_string().ok().map(|s| s.to_text()))
            .unwrap_or_default();
        writeln!(out, r#"<outline level="{}" title="{}">"#, level, escape_str(&title))?;

        let dest = match dict.get("Dest") {
            Some(dest) => Some(doc.resolve(dest)?),
            None => dict
                .get("A")
                .and_then(|a| doc.resolve(a).ok())
                .and_then(|a| {
                    let action = a.as_dict().ok()?;
                    if action.get_name("S") != Some("GoTo") {
                        return None;
                    }
                    doc.resolve(action.get("D")?).ok()
                }),
        };
        if let Some(dest) = &dest {
            write!(out, "<dest>")?;
            dumpxml(out, doc, dest, StreamCodec::None)?;
            writeln!(out, "</dest>")?;
            if let Ok(items) = dest.as_array()
                && let Some(PdfObject::Reference(page)) = items.first()
                && let Some(pageno) = pages.get(page)
            {
                writeln!(out, "<pageno>{pageno}</pageno>")?;
            }
        }
        writeln!(out, "</outline>")?;

        if let Some(child) = dict.get("First") {
            dump_outline_item(out, doc, child, pages, level + 1)?;
        }
        next = dict.get("Next").cloned();
    }
    Ok(())
}

fn dumppdf<W: Write>(out: &mut W, doc: &Document, objids: &[u32], codec: StreamCodec) -> Result<()> {
    if objids.is_empty() {
        dumptrailers(out, doc)?;
    }
    for &number in objids {
        let generation = match doc.xref().get(number) {
            Some(XrefEntry::Free { .. }) | None => {
                eprintln!("not found: object {number}");
                continue;
            }
            Some(entry) => entry.generation(),
        };
        dumpobject(out, doc, ObjRef::new(number, generation), codec)?;
    }
    if !matches!(codec, StreamCodec::Raw | StreamCodec::Binary) {
        writeln!(out)?;
    }
    Ok(())
}

/// Dump the internal structure of PDF files as XML.
#[derive(Parser, Debug)]
#[command(name = "dumppdf")]
#[command(author, version, about = "Dump PDF structure in XML format", long_about = None)]
#[command(disable_version_flag = true)]
#[command(group(
    ArgGroup::new("stream_codec")
        .args(["raw_stream", "binary_stream", "text_stream"])
))]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Dump the outline (table of contents)
    #[arg(short = 'T', long = "extract-toc", action = ArgAction::SetTrue)]
    extract_toc: bool,

    /// Object numbers to dump; repeat or separate with commas
    #[arg(short = 'i', long = "objects", value_delimiter = ',', action = ArgAction::Append)]
    objects: Vec<u32>,

    /// Dump every object in the cross-reference table
    #[arg(short = 'a', long = "all", action = ArgAction::SetTrue)]
    all: bool,

    /// The password to use for decrypting the file
    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Path to file where output is written, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,

    /// Write stream data as stored in the file
    #[arg(short = 'r', long = "raw-stream", action = ArgAction::SetTrue)]
    raw_stream: bool,

    /// Write decoded stream data as binary
    #[arg(short = 'b', long = "binary-stream", action = ArgAction::SetTrue)]
    binary_stream: bool,

    /// Write decoded stream data inside the XML
    #[arg(short = 't', long = "text-stream", action = ArgAction::SetTrue)]
    text_stream: bool,
}

fn main() -> core::result::Result<(), Box<dyn core::error::Error>> {
    let args = Args::parse();

    let codec = if args.raw_stream {
        StreamCodec::Raw
    } else if args.binary_stream {
        StreamCodec::Binary
    } else if args.text_stream {
        StreamCodec::Text
    } else {
        StreamCodec::None
    };

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(File::create(&args.outfile)?))
    };

    let options = OpenOptions::default().password(&args.password);
    for path in &args.files {
        if !path.exists() {
            eprintln!("Error: File not found: {}", path.display());
            std::process::exit(1);
        }

        let doc = Document::open(path, &options)?;
        if let Some(err) = doc.security_error() {
            eprintln!("Warning: {}: {err}", path.display());
        }

        if args.extract_toc {
            dumpoutline(&mut output, &doc)?;
        } else if args.all {
            dumpallobjs(&mut output, &doc, codec)?;
        } else {
            dumppdf(&mut output, &doc, &args.objects, codec)?;
        }
    }

    output.flush()?;
    Ok(())
}
