//! PDF text extraction and cleaning.
//!
//! The PDF library sits behind the [`TextSource`] trait so the pipeline can be
//! exercised against fixture text in tests. The default implementation uses
//! `lopdf` and distinguishes a missing file from a malformed document.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PipelineError;
use crate::settings::Settings;

/// Page-level text extraction collaborator.
pub trait TextSource: Send + Sync {
    /// Returns one string per page, in page order.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, PipelineError>;
}

/// Default extractor backed by `lopdf`.
pub struct LopdfTextSource;

impl TextSource for LopdfTextSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Extraction {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        let document = lopdf::Document::load(path).map_err(|err| PipelineError::Extraction {
            path: path.to_path_buf(),
            message: format!("lopdf failed to open document: {err}"),
        })?;

        let mut pages = Vec::new();
        for page_number in document.get_pages().keys().copied() {
            let text =
                document
                    .extract_text(&[page_number])
                    .map_err(|err| PipelineError::Extraction {
                        path: path.to_path_buf(),
                        message: format!("lopdf failed to extract page {page_number}: {err}"),
                    })?;
            pages.push(text);
        }
        Ok(pages)
    }
}

static REFERENCES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\n)+References.{0,2}(\n)+.*").expect("valid regex"));
static HYPHEN_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\n").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("valid regex"));

/// Reads a paper and returns its cleaned full text.
///
/// Cleaning order matters: the configured exclusion pattern and the trailing
/// References/appendix strip both run while page breaks are still present,
/// then hyphenated line breaks are joined and all whitespace is collapsed.
pub fn read_paper(
    source: &dyn TextSource,
    path: &Path,
    settings: &Settings,
) -> Result<String, PipelineError> {
    let pages = source.extract_pages(path)?;
    Ok(clean_text(pages.join("\n"), settings.exclude_pattern.as_deref()))
}

fn clean_text(raw: String, exclude_pattern: Option<&str>) -> String {
    let mut text = raw;

    if let Some(pattern) = exclude_pattern {
        match Regex::new(pattern) {
            Ok(re) => text = re.replace_all(&text, "").into_owned(),
            Err(err) => {
                tracing::warn!(pattern, error = %err, "ignoring invalid exclude pattern")
            }
        }
    }

    text = REFERENCES_RE.replace(&text, "").into_owned();
    text = HYPHEN_BREAK_RE.replace_all(&text, "").into_owned();
    text = text.replace('\n', " ");
    text = SPACES_RE.replace_all(&text, " ").into_owned();
    text.trim().to_string()
}

/// Truncates to at most `max` characters, respecting char boundaries.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
