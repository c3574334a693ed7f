//! Benchmarks for the decode path and document open.
//!
//! Benchmark groups:
//! - `flate`: FlateDecode and FlateEncode throughput at several sizes
//! - `lexer_tokenize`: raw tokenization of generated object syntax
//! - `parse_object`: `ObjectParser::parse_object` on nested dictionaries
//! - `document_open`: xref load of a generated classic-table file, and
//!   the brute-force rebuild of the same file with a broken `startxref`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quire_core::codec::{flatedecode, flateencode};
use quire_core::parser::{Lexer, ObjectParser};
use quire_core::{Dictionary, Document, FileWriter, PdfObject};
use std::hint::black_box;

// ============================================================================
// Data generation
// ============================================================================

/// Content-stream-like text, compressible the way real page content is.
fn generate_content(size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size + 64);
    let mut i = 0usize;
    while out.len() < size {
        out.extend_from_slice(
            format!("BT /F1 12 Tf {} {} Td (Line {i}) Tj ET\n", 72 + i % 400, 700 - i % 600)
                .as_bytes(),
        );
        i += 1;
    }
    out.truncate(size);
    out
}

/// A body of `count` indirect-object-shaped dictionaries.
fn generate_objects(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        out.extend_from_slice(
            format!(
                "{i} 0 obj\n<</Type /Annot /Subtype /Link /Rect [{} {} 100.5 20.25] \
                 /Border [0 0 1] /Contents (note {i}) /ID <{i:08x}> /P {} 0 R>>\nendobj\n",
                i % 612,
                i % 792,
                i + 1
            )
            .as_bytes(),
        );
    }
    out
}

/// One dictionary nested `depth` levels deep, each level carrying an array.
fn generate_nested(depth: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for level in 0..depth {
        out.extend_from_slice(format!("<</Level {level} /Items [1 2.5 /N (s) true] /Child ").as_bytes());
    }
    out.extend_from_slice(b"null");
    for _ in 0..depth {
        out.extend_from_slice(b">>");
    }
    out
}

/// A classic-table file with `count` small objects hung off the catalog.
fn generate_document(count: usize) -> Vec<u8> {
    let mut w = FileWriter::new("1.4");
    let catalog = w.reserve();
    let mut kids = Vec::with_capacity(count);
    for i in 0..count {
        let mut d = Dictionary::new();
        d.insert("Index", i as i64);
        d.insert("Label", PdfObject::string(format!("item {i}").into_bytes()));
        kids.push(PdfObject::Reference(w.add(d)));
    }
    let mut root = Dictionary::new();
    root.insert("Type", PdfObject::name("Catalog"));
    root.insert("Items", PdfObject::Array(kids));
    w.set(catalog, root);
    w.set_root(catalog);
    w.to_bytes().unwrap_or_default()
}

fn break_startxref(bytes: &[u8]) -> Vec<u8> {
    let at = bytes
        .windows(9)
        .rposition(|w| w == b"startxref")
        .unwrap_or(bytes.len());
    let mut out = bytes[..at].to_vec();
    out.extend_from_slice(b"startxref\n0\n%%EOF\n");
    out
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_flate(c: &mut Criterion) {
    let mut group = c.benchmark_group("flate");

    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let plain = generate_content(size);
        let compressed = flateencode(&plain).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("decode", size), &compressed, |b, data| {
            b.iter(|| flatedecode(black_box(data)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("encode", size), &plain, |b, data| {
            b.iter(|| flateencode(black_box(data)).unwrap())
        });
    }

    group.finish();
}

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_tokenize");

    for count in [100, 1_000, 10_000] {
        let data = generate_objects(count);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("objects", count), &data, |b, data| {
            b.iter(|| {
                let mut lexer = Lexer::new(black_box(data));
                let mut tokens = 0usize;
                while let Some(token) = lexer.next_token().unwrap() {
                    black_box(token);
                    tokens += 1;
                }
                tokens
            })
        });
    }

    group.finish();
}

fn bench_parse_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_object");

    for depth in [1, 16, 64] {
        let data = generate_nested(depth);
        group.bench_with_input(BenchmarkId::new("nested", depth), &data, |b, data| {
            b.iter(|| ObjectParser::new(black_box(data)).parse_object().unwrap())
        });
    }

    group.finish();
}

fn bench_document_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_open");
    group.sample_size(20);

    for count in [100, 2_000] {
        let intact = generate_document(count);
        let broken = break_startxref(&intact);

        group.bench_with_input(BenchmarkId::new("xref", count), &intact, |b, data| {
            b.iter(|| Document::new(black_box(data), "").unwrap())
        });
        group.bench_with_input(BenchmarkId::new("rebuild", count), &broken, |b, data| {
            b.iter(|| Document::new(black_box(data), "").unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flate,
    bench_tokenize,
    bench_parse_object,
    bench_document_open
);
criterion_main!(benches);
