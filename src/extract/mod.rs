//! Per-format text extraction.
//!
//! [`extract`] turns one routed [`Document`] into [`ExtractedSegment`]s.
//! Paged and tabular formats produce several segments (one per PDF page,
//! worksheet, or CSV row) so that chunk metadata can point back to the
//! exact location. Extraction never panics; every failure is an
//! [`ExtractError`] and the ingest pipeline skips the file.

mod email;
mod ooxml;
mod spreadsheet;

use std::panic::{self, UnwindSafe};
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use crate::config::ExtractConfig;
use crate::format::DocumentFormat;
use crate::models::{Document, ExtractedSegment};

/// Why a file could not be turned into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is {size} bytes, over the {limit} byte extraction limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
    #[error("CSV extraction failed: {0}")]
    Csv(String),
    #[error("email parsing failed: {0}")]
    Email(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Extract text segments from a document.
///
/// Every segment carries a `source` metadata key with the document path,
/// plus `page`, `sheet`, or `row` where the format has one. Blank segments
/// are dropped, so an empty return means the file held no text.
pub fn extract(
    doc: &Document,
    config: &ExtractConfig,
) -> Result<Vec<ExtractedSegment>, ExtractError> {
    let source = doc.path.display().to_string();
    let read = || read_bounded(&doc.path, config.max_extract_bytes);

    let segments = match doc.format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            vec![ExtractedSegment::new(String::from_utf8_lossy(&read()?), &source)]
        }
        DocumentFormat::Pdf => pdf_pages(&read()?, &source)?,
        DocumentFormat::Docx => vec![ExtractedSegment::new(ooxml::docx_text(&read()?)?, &source)],
        DocumentFormat::Spreadsheet => {
            spreadsheet::workbook_sheets(&read()?)?
                .into_iter()
                .map(|(sheet, text)| ExtractedSegment::new(text, &source).with_meta("sheet", sheet))
                .collect()
        }
        DocumentFormat::Csv => csv_rows(&read()?, &source)?,
        DocumentFormat::Email => vec![email_segment(&read()?, &source)?],
        DocumentFormat::Image => {
            check_size(&doc.path, config.max_extract_bytes)?;
            ocr_image(&doc.path, &source, &config.ocr_command)?
        }
    };

    Ok(segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect())
}

fn check_size(path: &Path, limit: u64) -> Result<(), ExtractError> {
    let size = std::fs::metadata(path)?.len();
    if size > limit {
        return Err(ExtractError::TooLarge { size, limit });
    }
    Ok(())
}

fn read_bounded(path: &Path, limit: u64) -> Result<Vec<u8>, ExtractError> {
    check_size(path, limit)?;
    Ok(std::fs::read(path)?)
}

fn pdf_pages(bytes: &[u8], source: &str) -> Result<Vec<ExtractedSegment>, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    let pages = catch_unwind_quietly(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| ExtractedSegment::new(text, source).with_meta("page", i + 1))
        .collect())
}

/// Serializes panic-hook swaps.
static PANIC_HOOK: Mutex<()> = Mutex::new(());

/// `catch_unwind` with the panic hook silenced, so a caught panic does not
/// print a message and backtrace notice to stderr.
fn catch_unwind_quietly<T>(f: impl FnOnce() -> T + UnwindSafe) -> std::thread::Result<T> {
    let _guard = PANIC_HOOK.lock().unwrap_or_else(|e| e.into_inner());
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let result = panic::catch_unwind(f);
    panic::set_hook(previous);
    result
}

/// One segment per record, each field rendered as `header: value`.
fn csv_rows(bytes: &[u8], source: &str) -> Result<Vec<ExtractedSegment>, ExtractError> {
    let csv_err = |e: csv::Error| ExtractError::Csv(e.to_string());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut segments = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let text = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = headers.get(i).map(String::as_str).unwrap_or("");
                format!("{}: {}", name, value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(ExtractedSegment::new(text, source).with_meta("row", row));
    }
    Ok(segments)
}

fn email_segment(bytes: &[u8], source: &str) -> Result<ExtractedSegment, ExtractError> {
    let mail = email::parse_eml(bytes)?;
    let text = match &mail.subject {
        Some(subject) => format!("Subject: {}\n\n{}", subject, mail.body),
        None => mail.body.clone(),
    };
    let mut segment = ExtractedSegment::new(text, source);
    for (key, value) in [
        ("subject", mail.subject),
        ("from", mail.from),
        ("to", mail.to),
        ("date", mail.date),
    ] {
        if let Some(value) = value {
            segment = segment.with_meta(key, value);
        }
    }
    Ok(segment)
}

/// Run `<ocr_command> <image> stdout` (tesseract's calling convention).
fn ocr_image(
    path: &Path,
    source: &str,
    command: &str,
) -> Result<Vec<ExtractedSegment>, ExtractError> {
    let output = Command::new(command)
        .arg(path)
        .arg("stdout")
        .output()
        .map_err(|e| ExtractError::Ocr(format!("failed to run '{}': {}", command, e)))?;
    if !output.status.success() {
        return Err(ExtractError::Ocr(format!(
            "'{}' exited with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(vec![ExtractedSegment::new(
        String::from_utf8_lossy(&output.stdout),
        source,
    )])
}
