//! pdfcheck - structural health check for many PDF files
//!
//! Opens every file on a thread pool, loads each object and decodes each
//! stream, then reports what was found. Exits with status 1 when any file
//! could not be opened or has unreadable content.

use clap::{ArgAction, Parser};
use quire_core::{BatchOptions, DocumentSummary, OpenOptions, PdfError, inspect_files};
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Check PDF files for damage, encryption and unreadable objects.
#[derive(Parser, Debug)]
#[command(name = "pdfcheck")]
#[command(author, version, about = "Check the structure of PDF files", long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Number of worker threads (default: available cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// The password to use for decrypting the files
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Emit one JSON document instead of a text report
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

/// One line of the report.
#[derive(Debug, Serialize)]
struct FileReport {
    path: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SummaryReport>,
}

#[derive(Debug, Serialize)]
struct SummaryReport {
    version: Option<String>,
    xref_entries: usize,
    objects: usize,
    streams: usize,
    recovered: bool,
    encrypted: bool,
    security_error: Option<String>,
    unreadable: Vec<String>,
    undecodable_streams: Vec<String>,
}

impl From<&DocumentSummary> for SummaryReport {
    fn from(s: &DocumentSummary) -> Self {
        Self {
            version: s.version.clone(),
            xref_entries: s.xref_entries,
            objects: s.objects,
            streams: s.streams,
            recovered: s.recovered,
            encrypted: s.encrypted,
            security_error: s.security_error.clone(),
            unreadable: s.unreadable.iter().map(ToString::to_string).collect(),
            undecodable_streams: s
                .undecodable_streams
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

fn report(path: &Path, result: &Result<DocumentSummary, PdfError>) -> FileReport {
    let path = path.display().to_string();
    match result {
        Ok(summary) => FileReport {
            path,
            ok: summary.is_clean(),
            error: None,
            summary: Some(summary.into()),
        },
        Err(e) => FileReport {
            path,
            ok: false,
            error: Some(e.to_string()),
            summary: None,
        },
    }
}

fn write_text<W: Write>(out: &mut W, report: &FileReport) -> io::Result<()> {
    let status = if report.ok { "OK" } else { "FAIL" };
    write!(out, "{status}\t{}", report.path)?;
    if let Some(error) = &report.error {
        return writeln!(out, "\t{error}");
    }
    if let Some(s) = &report.summary {
        write!(
            out,
            "\tPDF-{}\t{} objects\t{} streams",
            s.version.as_deref().unwrap_or("?"),
            s.objects,
            s.streams
        )?;
        if s.recovered {
            write!(out, "\trecovered")?;
        }
        if s.encrypted {
            write!(out, "\tencrypted")?;
        }
        if let Some(err) = &s.security_error {
            write!(out, "\t{err}")?;
        }
        if !s.unreadable.is_empty() {
            write!(out, "\tunreadable: {}", s.unreadable.join(", "))?;
        }
        if !s.undecodable_streams.is_empty() {
            write!(out, "\tundecodable: {}", s.undecodable_streams.join(", "))?;
        }
    }
    writeln!(out)
}

fn main() -> core::result::Result<(), Box<dyn core::error::Error>> {
    let args = Args::parse();

    let mut open = OpenOptions::default();
    if let Some(password) = &args.password {
        open = open.password(password);
    }
    let options = BatchOptions {
        open,
        threads: args.threads,
    };

    let results = inspect_files(&args.files, &options)?;
    let reports: Vec<FileReport> = results
        .iter()
        .map(|(path, result)| report(path, result))
        .collect();

    let mut out = BufWriter::new(io::stdout());
    if args.json {
        serde_json::to_writer_pretty(&mut out, &reports)?;
        writeln!(out)?;
    } else {
        for r in &reports {
            write_text(&mut out, r)?;
        }
    }
    out.flush()?;

    if reports.iter().any(|r| !r.ok) {
        std::process::exit(1);
    }
    Ok(())
}
