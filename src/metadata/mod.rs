//! Bibliographic metadata derivation.
//!
//! Author, year, and title come from the file's base name whenever it follows
//! the `"<author> (<year>) <title>"` naming convention; only when it does not
//! is the model asked to infer them from the opening of the paper text. Both
//! attempts feed the same [`NameParse`] decision procedure, and a double miss
//! degrades to a sentinel record instead of an error. DOI and abstract
//! detection run independently of that outcome.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::truncate_chars;
use crate::gateway::{GenerationRequest, ModelGateway};
use crate::pipeline::RunAccumulator;
use crate::settings::Settings;

/// Structured metadata for one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub author: String,
    pub year: i32,
    pub title: String,
    pub project: String,
    pub doi_link: Option<String>,
    pub abstract_text: String,
}

/// Result of matching a candidate string against the naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameParse {
    Matched {
        author: String,
        year: i32,
        title: String,
    },
    Unresolved,
}

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<author>(?:[\w\s.]+(?:,\s*)?)+?)\s+\((?P<year>\d{4})\)\s+(?P<title>.+)$")
        .expect("valid regex")
});
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(10\.\d{4,9}/[-._;()/:A-Z0-9]+)\b").expect("valid regex"));
static ABSTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)Abstract(.*?)(\n\n|\z)").expect("valid regex"));
static ABSTRACT_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)(key\s?words|introduction).*").expect("valid regex"));
static ABSTRACT_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^abstract").expect("valid regex"));

const FALLBACK_INSTRUCTION: &str = "Please extract from the following text the information about \
    the author(s), the publishing year and the title. Provide the information in the following \
    format: author (year) title";

pub const NO_ABSTRACT_SENTINEL: &str = "No abstract found.";

/// Matches a candidate against the `"<author> (<year>) <title>"` shape.
pub fn parse_name_convention(candidate: &str) -> NameParse {
    match NAME_RE.captures(candidate.trim()) {
        Some(captures) => NameParse::Matched {
            author: captures["author"].to_string(),
            year: captures["year"].parse().unwrap_or(0),
            title: captures["title"].to_string(),
        },
        None => NameParse::Unresolved,
    }
}

/// Finds a DOI in the first 10000 characters and builds its resolver URL.
pub fn extract_doi_link(text: &str) -> Option<String> {
    DOI_RE
        .captures(truncate_chars(text, 10_000))
        .map(|captures| format!("https://doi.org/{}", &captures[1]))
}

/// Captures the abstract following a case-insensitive "Abstract" marker.
///
/// The capture is truncated to roughly 2000 characters, trailing
/// keywords/introduction sections are cut, and the marker itself is removed.
/// Text without a marker yields the sentinel.
pub fn extract_abstract(text: &str) -> String {
    match ABSTRACT_RE.captures(text) {
        Some(captures) => {
            let mut abstract_text = format!("{}...", truncate_chars(captures[1].trim(), 1995));
            abstract_text = ABSTRACT_TAIL_RE.replace(&abstract_text, "").into_owned();
            abstract_text = ABSTRACT_MARKER_RE.replace(&abstract_text, "").into_owned();
            abstract_text.trim().to_string()
        }
        None => NO_ABSTRACT_SENTINEL.to_string(),
    }
}

/// Regex-first, model-fallback metadata extraction.
pub struct MetadataExtractor<'a> {
    settings: &'a Settings,
    gateway: &'a ModelGateway<'a>,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(settings: &'a Settings, gateway: &'a ModelGateway<'a>) -> Self {
        Self { settings, gateway }
    }

    /// Derives the full metadata record for one paper. Never fails: a double
    /// miss on author/year/title degrades to the `Unknown`/`0` sentinel.
    pub fn extract(
        &self,
        base_name: &str,
        raw_text: &str,
        accumulator: &mut RunAccumulator,
    ) -> Metadata {
        let (author, year, title) = match parse_name_convention(base_name) {
            NameParse::Matched {
                author,
                year,
                title,
            } => (author, year, title),
            NameParse::Unresolved => self.infer_from_text(raw_text, accumulator),
        };

        Metadata {
            author,
            year,
            title,
            project: self.settings.project_name.clone(),
            doi_link: extract_doi_link(raw_text),
            abstract_text: extract_abstract(raw_text),
        }
    }

    fn infer_from_text(
        &self,
        raw_text: &str,
        accumulator: &mut RunAccumulator,
    ) -> (String, i32, String) {
        let response = self.gateway.generate(
            &GenerationRequest {
                instruction: FALLBACK_INSTRUCTION.to_string(),
                prompt: truncate_chars(raw_text, 1000).to_string(),
                model: self.settings.summarizer_model.clone(),
                ..GenerationRequest::default()
            },
            accumulator,
        );

        if let Some(text) = response.text {
            if let NameParse::Matched {
                author,
                year,
                title,
            } = parse_name_convention(&text)
            {
                return (author, year, title);
            }
        }

        warn!("metadata could not be derived from the document name or the text");
        ("Unknown".to_string(), 0, "Unknown".to_string())
    }
}
