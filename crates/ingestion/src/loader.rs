//! Source decoding
//!
//! PDF files are decoded page by page with lopdf; everything else is read as
//! UTF-8 text.

use ragforge_common::document::{Document, PAGE_KEY, SOURCE_KEY, TOTAL_PAGES_KEY};
use ragforge_common::errors::{AppError, Result};
use std::path::Path;
use tracing::debug;

/// How a source is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    /// Pick the decoder from the file extension, case-insensitively
    pub fn from_name(name: &str) -> Self {
        let is_pdf = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            SourceKind::Pdf
        } else {
            SourceKind::Text
        }
    }
}

/// Decode raw bytes into documents tagged with `source`
pub fn decode(bytes: &[u8], kind: SourceKind, source: &str) -> Result<Vec<Document>> {
    match kind {
        SourceKind::Pdf => decode_pdf(bytes, source),
        SourceKind::Text => decode_text(bytes, source).map(|doc| vec![doc]),
    }
}

fn decode_text(bytes: &[u8], source: &str) -> Result<Document> {
    let content = std::str::from_utf8(bytes).map_err(|e| AppError::Parse {
        source_name: source.to_string(),
        message: format!("not valid UTF-8 text: {}", e),
    })?;

    Ok(Document::new(content.trim_start_matches('\u{FEFF}')).with_metadata(SOURCE_KEY, source))
}

/// One document per page that yields text
fn decode_pdf(bytes: &[u8], source: &str) -> Result<Vec<Document>> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::Parse {
        source_name: source.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    if doc.is_encrypted() {
        return Err(AppError::Parse {
            source_name: source.to_string(),
            message: "encrypted PDFs are not supported".to_string(),
        });
    }

    let pages = doc.get_pages();
    let total_pages = pages.len();

    debug!(source, page_count = total_pages, "Extracting text from PDF");

    let extracted = pages
        .keys()
        .copied()
        .map(|page_num| (page_num, doc.extract_text(&[page_num])));

    collect_pages(source, total_pages, extracted)
}

/// Build page documents, skipping blank pages. A page that fails to
/// extract fails the whole source, as does a PDF without any text.
fn collect_pages<E, I>(source: &str, total_pages: usize, pages: I) -> Result<Vec<Document>>
where
    E: std::fmt::Display,
    I: IntoIterator<Item = (u32, std::result::Result<String, E>)>,
{
    let mut documents = Vec::with_capacity(total_pages);

    for (page_num, extracted) in pages {
        let text = extracted.map_err(|e| AppError::Parse {
            source_name: source.to_string(),
            message: format!("Failed to extract text from page {}: {}", page_num, e),
        })?;

        let text = clean_page_text(&text);
        if text.is_empty() {
            debug!(source, page = page_num, "Page has no text");
            continue;
        }
        documents.push(
            Document::new(text)
                .with_metadata(SOURCE_KEY, source)
                .with_metadata(PAGE_KEY, page_num as i64)
                .with_metadata(TOTAL_PAGES_KEY, total_pages),
        );
    }

    if documents.is_empty() {
        return Err(AppError::Parse {
            source_name: source.to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    Ok(documents)
}

/// Normalize extracted page text: drop BOMs and trailing spaces, keep lines
fn clean_page_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
