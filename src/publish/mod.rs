//! Hosted-database publisher.
//!
//! Speaks a Notion-style REST protocol: bearer-token auth, a versioned
//! protocol header, `GET`/`PATCH` on the database for schema management and
//! `POST` for record creation. The base URL is taken from the settings so
//! tests can point it at a local mock server.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::gateway::{GenerationRequest, ModelGateway};
use crate::metadata::Metadata;
use crate::pipeline::RunAccumulator;
use crate::settings::Settings;

/// Per-block character limit of the remote service.
const BLOCK_CHAR_LIMIT: usize = 2000;

/// Placeholder stored for empty author/title values.
const NOT_PROVIDED: &str = "not provided";

pub struct DatabasePublisher<'a> {
    settings: &'a Settings,
    gateway: &'a ModelGateway<'a>,
    http: reqwest::blocking::Client,
}

impl<'a> DatabasePublisher<'a> {
    pub fn new(settings: &'a Settings, gateway: &'a ModelGateway<'a>) -> Self {
        Self {
            settings,
            gateway,
            http: reqwest::blocking::Client::new(),
        }
    }

    fn database_url(&self) -> String {
        format!(
            "{}/v1/databases/{}",
            self.settings.database_api_url.trim_end_matches('/'),
            self.settings.database_id
        )
    }

    fn pages_url(&self) -> String {
        format!(
            "{}/v1/pages",
            self.settings.database_api_url.trim_end_matches('/')
        )
    }

    /// Adds any expected column missing from the remote schema.
    ///
    /// Runs once per batch before the first paper; failures are logged and
    /// the run continues, since record creation surfaces its own errors.
    pub fn ensure_schema(&self) {
        if let Err(err) = self.check_and_add_missing_columns() {
            error!(error = %err, "database schema check failed");
        }
    }

    fn check_and_add_missing_columns(&self) -> Result<(), PipelineError> {
        let url = self.database_url();
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.settings.database_token)
            .header("Notion-Version", &self.settings.database_api_version)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Publish(format!(
                "failed to read database schema ({status}): {}",
                response.text().unwrap_or_default()
            )));
        }

        let body: Value = response.json()?;
        let existing = body["properties"].as_object().cloned().unwrap_or_default();
        let missing: Map<String, Value> = expected_columns()
            .into_iter()
            .filter(|(name, _)| !existing.contains_key(name))
            .collect();

        if missing.is_empty() {
            debug!("database schema already complete");
            return Ok(());
        }

        let column_names: Vec<&str> = missing.keys().map(String::as_str).collect();
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.settings.database_token)
            .header("Notion-Version", &self.settings.database_api_version)
            .json(&json!({ "properties": Value::Object(missing.clone()) }))
            .send()?;
        let status = response.status();
        if status.is_success() {
            info!(columns = ?column_names, "missing database columns added");
            Ok(())
        } else {
            Err(PipelineError::Publish(format!(
                "failed to add missing columns ({status}): {}",
                response.text().unwrap_or_default()
            )))
        }
    }

    /// Inserts one record. Empty author/title values are stored as
    /// placeholders; a negative year is the only hard rejection.
    pub fn publish(
        &self,
        metadata: &Metadata,
        summary: &str,
        digest: &str,
        accumulator: &mut RunAccumulator,
    ) -> Result<(), PipelineError> {
        if metadata.year < 0 {
            return Err(PipelineError::InvalidMetadata(
                "the record year must be a non-negative integer".to_string(),
            ));
        }
        let author = non_empty_or(&metadata.author, NOT_PROVIDED);
        let title = non_empty_or(&metadata.title, NOT_PROVIDED);

        let mut properties = json!({
            "Title": { "title": [{ "text": { "content": title } }] },
            "Author": { "rich_text": [{ "text": { "content": author } }] },
            "Year": { "number": metadata.year },
            "Added": { "date": { "start": Utc::now().date_naive().to_string() } },
            "Essence": { "rich_text": [{ "text": { "content": digest } }] },
            "Status": { "select": { "name": "To Do" } },
            "URL": { "url": metadata.doi_link.clone() },
        });
        if !metadata.project.is_empty() {
            properties["Project"] =
                json!({ "rich_text": [{ "text": { "content": metadata.project } }] });
        }
        if let Some(tags) = self.assign_tags(summary, accumulator) {
            properties["Notes"] = json!({ "rich_text": [{ "text": { "content": tags } }] });
        }

        let mut children = Vec::new();
        if !metadata.abstract_text.is_empty() {
            children.push(callout_block(&metadata.abstract_text));
        }
        children.extend(summary_blocks(title, summary));

        let payload = json!({
            "parent": { "database_id": self.settings.database_id },
            "properties": properties,
            "children": children,
        });
        let response = self
            .http
            .post(self.pages_url())
            .bearer_auth(&self.settings.database_token)
            .header("Notion-Version", &self.settings.database_api_version)
            .json(&payload)
            .send()?;
        let status = response.status();
        if status.is_success() {
            info!(title, "database record created");
            Ok(())
        } else {
            Err(PipelineError::Publish(format!(
                "failed to create record ({status}): {}",
                response.text().unwrap_or_default()
            )))
        }
    }

    /// Assigns 1-3 tags from the configured vocabulary, if one is set.
    fn assign_tags(&self, summary: &str, accumulator: &mut RunAccumulator) -> Option<String> {
        let vocabulary = self.settings.tag_vocabulary();
        if vocabulary.is_empty() {
            return None;
        }

        let instruction = format!(
            "Read the following text and assign 1-3 of the following labels to it. Please only \
             provide labels that truly describe the text. If you find no label matches the text, \
             return \"none\". Return the labels as a comma-separated list.\nTags: {}",
            vocabulary.join(", ")
        );
        let result = self.gateway.generate(
            &GenerationRequest {
                instruction,
                prompt: summary.to_string(),
                model: self.settings.newsletter_model.clone(),
                ..GenerationRequest::default()
            },
            accumulator,
        );
        result
            .text
            .filter(|tags| !tags.is_empty() && tags.to_ascii_lowercase() != "none")
    }
}

fn non_empty_or<'v>(value: &'v str, fallback: &'v str) -> &'v str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Expected column set, with the fixed type definition used when patching.
fn expected_columns() -> Map<String, Value> {
    let columns = json!({
        "Title": { "title": {} },
        "Author": { "rich_text": {} },
        "Year": { "number": {} },
        "Added": { "date": {} },
        "Essence": { "rich_text": {} },
        "Status": {
            "select": {
                "options": [
                    { "name": "To Do", "color": "red" },
                    { "name": "In Progress", "color": "yellow" },
                    { "name": "Done", "color": "green" },
                ]
            }
        },
        "URL": { "url": {} },
        "Project": { "rich_text": {} },
        "Notes": { "rich_text": {} },
    });
    match columns {
        Value::Object(map) => map,
        _ => unreachable!("expected columns are a JSON object"),
    }
}

/// Renders a summary as a heading followed by size-limited paragraph blocks.
fn summary_blocks(title: &str, summary: &str) -> Vec<Value> {
    let mut blocks = vec![json!({
        "object": "block",
        "type": "heading_3",
        "heading_3": {
            "rich_text": [{
                "type": "text",
                "text": { "content": format!("Summary of: {title}") },
                "annotations": { "bold": true },
            }]
        }
    })];
    for chunk in split_text_blocks(summary, BLOCK_CHAR_LIMIT) {
        blocks.push(paragraph_block(&chunk));
    }
    blocks.push(paragraph_block("\n"));
    blocks
}

fn paragraph_block(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": [{ "type": "text", "text": { "content": content } }]
        }
    })
}

fn callout_block(abstract_text: &str) -> Value {
    json!({
        "object": "block",
        "type": "callout",
        "callout": {
            "rich_text": [
                {
                    "type": "text",
                    "text": { "content": "Abstract: " },
                    "annotations": { "bold": true },
                },
                { "type": "text", "text": { "content": abstract_text.trim() } },
            ],
            "icon": { "emoji": "\u{1F4CC}" }
        }
    })
}

/// Splits text into chunks of at most `limit` characters, breaking only at
/// whitespace. A single whitespace-free run longer than the limit is the one
/// case where the size cap wins and the run is cut at the limit.
pub fn split_text_blocks(text: &str, limit: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for piece in text.split_inclusive(|c: char| c.is_whitespace()) {
        let piece_chars = piece.chars().count();
        if piece_chars > limit {
            flush(&mut current, &mut current_chars, &mut blocks);
            let remainder = hard_split(piece.trim_end(), limit, &mut blocks);
            current.push_str(&remainder);
            current_chars = remainder.chars().count();
            continue;
        }
        if current_chars + piece_chars > limit {
            flush(&mut current, &mut current_chars, &mut blocks);
        }
        current.push_str(piece);
        current_chars += piece_chars;
    }
    flush(&mut current, &mut current_chars, &mut blocks);
    blocks
}

fn flush(current: &mut String, current_chars: &mut usize, blocks: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
    current.clear();
    *current_chars = 0;
}

fn hard_split(run: &str, limit: usize, blocks: &mut Vec<String>) -> String {
    let mut rest = run;
    while rest.chars().count() > limit {
        let cut = rest
            .char_indices()
            .nth(limit)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        blocks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    rest.to_string()
}
