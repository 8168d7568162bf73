use crate::error::{ReportError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub text: String,
    pub source: String,
    /// 1-based.
    pub page_number: usize,
}

/// Per-page text of one filing, as produced by a [`DocumentLoader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn from_pages<S: Into<String>>(source: &str, pages: impl IntoIterator<Item = S>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                text: text.into(),
                source: source.to_string(),
                page_number: i + 1,
            })
            .collect();
        Self {
            source: source.to_string(),
            pages,
        }
    }

    /// Splits extracted text at form feeds, which both PDF text extraction and
    /// paginated plain-text exports emit between pages.
    pub fn from_paginated_text(source: &str, text: &str) -> Self {
        let mut chunks: Vec<&str> = text.split(PAGE_BREAK).collect();
        while chunks.len() > 1 && chunks.last().is_some_and(|c| c.trim().is_empty()) {
            chunks.pop();
        }
        Self::from_pages(source, chunks)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page_number: usize) -> Option<&Page> {
        page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
    }

    /// All pages joined by a blank line.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Converts a file on disk into per-page text.
pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document>;
}

fn unreadable(path: &Path, reason: impl ToString) -> ReportError {
    ReportError::DocumentUnreadable {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Reads UTF-8 text, one page per form-feed separated chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let text = std::fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
        let document = Document::from_paginated_text(&path.display().to_string(), &text);
        debug!(
            "Read {} pages of plain text from {}",
            document.page_count(),
            path.display()
        );
        Ok(document)
    }
}

#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

#[cfg(feature = "pdf")]
impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path).map_err(|e| unreadable(path, e))?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| unreadable(path, e))?;
        if text.trim().is_empty() {
            return Err(unreadable(
                path,
                "no extractable text (the PDF may be scanned images)",
            ));
        }
        let document = Document::from_paginated_text(&path.display().to_string(), &text);
        info!(
            "Extracted {} pages from PDF {}",
            document.page_count(),
            path.display()
        );
        Ok(document)
    }
}

/// Picks the loader by file extension: PDF when the `pdf` feature is on,
/// plain text otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoLoader;

impl DocumentLoader for AutoLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            load_pdf(path)
        } else {
            PlainTextLoader.load(path)
        }
    }
}

#[cfg(feature = "pdf")]
fn load_pdf(path: &Path) -> Result<Document> {
    PdfLoader.load(path)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(path: &Path) -> Result<Document> {
    Err(unreadable(
        path,
        "PDF support is disabled; rebuild with the `pdf` feature",
    ))
}
