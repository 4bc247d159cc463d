//! Run configuration for the paper pipeline.
//!
//! Loaded once from a flat TOML file and treated as immutable for the whole
//! run. Every option has a documented default; feature toggles accept native
//! booleans as well as the literal strings "true"/"1"/"yes" (case-insensitive,
//! anything else is false). Unknown keys are ignored.
//!
//! Credentials are only required for the features that are switched on, and
//! that requirement is checked once up front by [`Settings::validate`] so a
//! misconfigured feature fails before any paper is processed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PipelineError;

/// Root configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model used for summaries, metadata fallback, and one-line digests.
    #[serde(default = "default_summarizer_model")]
    pub summarizer_model: String,
    /// Model used for audio narration (audio-preview style or dedicated TTS).
    #[serde(default = "default_audio_model")]
    pub audio_model: String,
    /// Model used for the newsletter and tag assignment.
    #[serde(default = "default_newsletter_model")]
    pub newsletter_model: String,

    /// Output language for summaries and the newsletter.
    #[serde(default = "default_language")]
    pub text_language: String,
    /// Output language for audio narration.
    #[serde(default = "default_language")]
    pub audio_language: String,

    /// Narration voice; the sentinel "shuffle" picks one at random per paper.
    #[serde(default = "default_voice")]
    pub tts_voice: String,
    #[serde(default = "default_speed")]
    pub tts_speed: f32,
    /// Audio container format, with or without a leading dot.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Directory scanned (one level deep) for input PDFs.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Directory receiving summaries, audio files, and the portfolio.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Optional regex removed from extracted text before any other cleaning.
    #[serde(default)]
    pub exclude_pattern: Option<String>,

    #[serde(default = "default_llm_instruction")]
    pub llm_instruction: String,
    #[serde(default = "default_llm_prompt")]
    pub llm_prompt: String,

    #[serde(default = "default_true", deserialize_with = "flag")]
    pub create_summary: bool,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub create_audio: bool,
    #[serde(default = "default_false", deserialize_with = "flag")]
    pub publish_to_database: bool,
    #[serde(default = "default_false", deserialize_with = "flag")]
    pub build_portfolio: bool,
    #[serde(default = "default_false", deserialize_with = "flag")]
    pub build_newsletter: bool,
    #[serde(default = "default_false", deserialize_with = "flag")]
    pub send_email: bool,
    #[serde(default = "default_false", deserialize_with = "flag")]
    pub delete_after_processing: bool,

    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub database_token: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default = "default_database_api_url")]
    pub database_api_url: String,
    #[serde(default = "default_database_api_version")]
    pub database_api_version: String,
    /// Project name attached verbatim to every metadata record.
    #[serde(default)]
    pub project_name: String,
    /// Comma-separated tag vocabulary; empty disables tag assignment.
    #[serde(default)]
    pub database_tags: String,

    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub email_from: String,
    /// Comma-separated recipient list.
    #[serde(default)]
    pub email_to: String,
    #[serde(default = "default_email_subject")]
    pub email_subject: String,
    #[serde(default = "default_email_body")]
    pub email_body: String,
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str("").expect("empty settings table deserializes via field defaults")
    }
}

impl Settings {
    /// Audio file extension without a leading separator.
    pub fn audio_extension(&self) -> &str {
        self.audio_format.trim_start_matches('.')
    }

    /// Recipient addresses parsed from the comma-separated `email_to` value.
    pub fn recipients(&self) -> Vec<String> {
        self.email_to
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Tag vocabulary parsed from the comma-separated `database_tags` value.
    pub fn tag_vocabulary(&self) -> Vec<String> {
        self.database_tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Checks that every enabled feature has the credentials it needs.
    ///
    /// Runs once before any file is processed; a failure here is the only
    /// error that aborts a run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut missing: Vec<&str> = Vec::new();

        if self.api_key.is_empty() {
            missing.push("api_key");
        }
        if self.publish_to_database {
            if self.database_token.is_empty() {
                missing.push("database_token");
            }
            if self.database_id.is_empty() {
                missing.push("database_id");
            }
        }
        if self.send_email {
            for (value, key) in [
                (&self.smtp_host, "smtp_host"),
                (&self.smtp_user, "smtp_user"),
                (&self.smtp_password, "smtp_password"),
                (&self.email_from, "email_from"),
                (&self.email_to, "email_to"),
            ] {
                if value.is_empty() {
                    missing.push(key);
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "missing required settings for enabled features: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Loads the settings file, or returns defaults when it does not exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        let settings: Settings = toml::from_str(&data)
            .with_context(|| format!("Failed to parse settings file {:?}", path))?;
        Ok(settings)
    } else {
        tracing::warn!(path = %path.display(), "settings file not found, using defaults");
        Ok(Settings::default())
    }
}

/// Accepts `true`/`false` as well as the literal strings "true"/"1"/"yes".
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(value) => {
            matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        }
    })
}

fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_audio_model() -> String {
    "gpt-4o-mini-audio-preview".to_string()
}

fn default_newsletter_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

const fn default_speed() -> f32 {
    1.0
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("papers")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_llm_instruction() -> String {
    "You are a research assistant specializing in summarizing research papers.".to_string()
}

fn default_llm_prompt() -> String {
    "Your task is to write a detailed summary of the following research paper. \
     Focus on the methodology and the results of the paper. Finally relate the \
     results to other research on this topic."
        .to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_false() -> bool {
    false
}

fn default_api_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_database_api_url() -> String {
    "https://api.notion.com".to_string()
}

fn default_database_api_version() -> String {
    "2022-06-28".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_email_subject() -> String {
    "New Summaries".to_string()
}

fn default_email_body() -> String {
    "Hey,\n\nattached you find some new paper summaries.\nEnjoy listening!\n".to_string()
}
