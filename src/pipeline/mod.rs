//! Per-paper processing pipeline.
//!
//! Each input file walks the stage sequence read → metadata → summarize →
//! audio → publish. Stages are gated by their feature toggles, and a stage
//! failure is recorded on the paper's outcome and logged but never escapes:
//! the batch always continues with the next file. Only a text-extraction
//! failure marks the paper itself as failed and skips its remaining stages.

pub mod accumulator;

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::extract::{read_paper, TextSource};
use crate::gateway::{count_tokens, GenerationRequest, ModelGateway, ModelKind};
use crate::metadata::{Metadata, MetadataExtractor};
use crate::publish::DatabasePublisher;
use crate::settings::Settings;

pub use accumulator::{CostTotals, RunAccumulator, RunSnapshot};

/// Narration voices offered by the audio models.
const VOICE_OPTIONS: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "onyx", "nova", "shimmer",
];
/// Voice setting that requests a random pick per paper.
const VOICE_SHUFFLE: &str = "shuffle";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractText,
    ResolveMetadata,
    Summarize,
    SynthesizeAudio,
    Publish,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::ExtractText => "extract-text",
            Stage::ResolveMetadata => "resolve-metadata",
            Stage::Summarize => "summarize",
            Stage::SynthesizeAudio => "synthesize-audio",
            Stage::Publish => "publish",
        }
    }
}

/// A recorded per-stage failure.
#[derive(Debug, Clone)]
pub struct StageIssue {
    pub stage: Stage,
    pub message: String,
}

/// One paper's in-memory state while it moves through the pipeline.
#[derive(Debug)]
pub struct PaperRecord {
    pub source_path: PathBuf,
    pub base_name: String,
    pub raw_text: Option<String>,
    pub metadata: Option<Metadata>,
    pub summary: Option<String>,
    pub token_count: usize,
}

impl PaperRecord {
    fn new(source_path: &Path) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            base_name: safe_base_name(source_path),
            raw_text: None,
            metadata: None,
            summary: None,
            token_count: 0,
        }
    }
}

/// Result of processing one file: the final record plus stage bookkeeping.
#[derive(Debug)]
pub struct FileOutcome {
    pub record: PaperRecord,
    pub completed: Vec<Stage>,
    pub issues: Vec<StageIssue>,
}

impl FileOutcome {
    fn new(record: PaperRecord) -> Self {
        Self {
            record,
            completed: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn mark(&mut self, stage: Stage) {
        self.completed.push(stage);
    }

    fn record_issue(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        warn!(
            file = %self.record.source_path.display(),
            stage = stage.label(),
            message,
            "stage failed"
        );
        self.issues.push(StageIssue { stage, message });
    }

    /// Whether the paper itself failed (its text never became available).
    pub fn failed(&self) -> bool {
        self.issues.iter().any(|i| i.stage == Stage::ExtractText)
    }

    pub fn clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Drives one paper through all enabled stages.
pub struct PaperProcessor<'a> {
    settings: &'a Settings,
    gateway: &'a ModelGateway<'a>,
    text_source: &'a dyn TextSource,
    publisher: Option<&'a DatabasePublisher<'a>>,
}

impl<'a> PaperProcessor<'a> {
    pub fn new(
        settings: &'a Settings,
        gateway: &'a ModelGateway<'a>,
        text_source: &'a dyn TextSource,
        publisher: Option<&'a DatabasePublisher<'a>>,
    ) -> Self {
        Self {
            settings,
            gateway,
            text_source,
            publisher,
        }
    }

    pub fn process(&self, path: &Path, accumulator: &mut RunAccumulator) -> FileOutcome {
        let mut outcome = FileOutcome::new(PaperRecord::new(path));
        info!(file = %path.display(), "processing paper");

        match read_paper(self.text_source, path, self.settings) {
            Ok(text) => {
                outcome.record.token_count = count_tokens(&text);
                outcome.record.raw_text = Some(text);
                outcome.mark(Stage::ExtractText);
            }
            Err(err) => {
                outcome.record_issue(Stage::ExtractText, err.to_string());
                return outcome;
            }
        }

        self.resolve_metadata(&mut outcome, accumulator);

        if self.settings.create_summary {
            self.summarize(&mut outcome, accumulator);
        }

        if self.settings.create_audio {
            if outcome.record.summary.is_some() {
                self.synthesize_audio(&mut outcome, accumulator);
            } else {
                warn!(
                    file = %outcome.record.source_path.display(),
                    "audio narration skipped, no summary available"
                );
            }
        }

        if let Some(publisher) = self.publisher {
            if outcome.record.summary.is_some() {
                self.publish(publisher, &mut outcome, accumulator);
            } else {
                warn!(
                    file = %outcome.record.source_path.display(),
                    "database publish skipped, no summary available"
                );
            }
        }

        outcome
    }

    fn resolve_metadata(&self, outcome: &mut FileOutcome, accumulator: &mut RunAccumulator) {
        let raw_text = outcome.record.raw_text.clone().unwrap_or_default();
        let extractor = MetadataExtractor::new(self.settings, self.gateway);
        let metadata = extractor.extract(&outcome.record.base_name, &raw_text, accumulator);
        accumulator.push_record(metadata.clone());
        outcome.record.metadata = Some(metadata);
        outcome.mark(Stage::ResolveMetadata);
    }

    fn summarize(&self, outcome: &mut FileOutcome, accumulator: &mut RunAccumulator) {
        let raw_text = outcome.record.raw_text.as_deref().unwrap_or_default();
        let prompt = format!(
            "{}{}\n\n{}",
            self.settings.llm_prompt,
            language_suffix(&self.settings.text_language),
            raw_text
        );

        let result = self.gateway.generate(
            &GenerationRequest {
                instruction: self.settings.llm_instruction.clone(),
                prompt,
                model: self.settings.summarizer_model.clone(),
                target: Some(self.settings.output_dir.join(&outcome.record.base_name)),
                ..GenerationRequest::default()
            },
            accumulator,
        );

        match result.text {
            Some(text) => {
                let doi_link = outcome
                    .record
                    .metadata
                    .as_ref()
                    .and_then(|m| m.doi_link.as_deref());
                let summary = match doi_link {
                    Some(link) => format!("{text}\n\n{link}"),
                    None => text,
                };
                accumulator.push_summary(summary.clone());
                outcome.record.summary = Some(summary);
                outcome.mark(Stage::Summarize);
            }
            None => outcome.record_issue(Stage::Summarize, "model returned no summary"),
        }
    }

    fn synthesize_audio(&self, outcome: &mut FileOutcome, accumulator: &mut RunAccumulator) {
        let summary = outcome.record.summary.clone().unwrap_or_default();
        let model = self.settings.audio_model.clone();
        let target = self.settings.output_dir.join(&outcome.record.base_name);

        let request = match ModelKind::classify(&model) {
            // Chat-capable audio models rewrite into a spoken register and
            // synthesize in the same call.
            ModelKind::AudioPreview | ModelKind::Chat => GenerationRequest {
                instruction: spoken_register_instruction(&self.settings.audio_language),
                prompt: summary,
                model,
                voice: Some(self.choose_voice()),
                format: Some(self.settings.audio_extension().to_string()),
                target: Some(target),
            },
            ModelKind::Speech => GenerationRequest {
                instruction: String::new(),
                prompt: summary,
                model,
                voice: Some(self.choose_voice()),
                format: Some(self.settings.audio_extension().to_string()),
                target: Some(target),
            },
        };

        let result = self.gateway.generate(&request, accumulator);
        match result.audio_file {
            Some(path) => {
                accumulator.push_attachment(path);
                outcome.mark(Stage::SynthesizeAudio);
            }
            None => outcome.record_issue(Stage::SynthesizeAudio, "no audio file produced"),
        }
    }

    fn publish(
        &self,
        publisher: &DatabasePublisher<'_>,
        outcome: &mut FileOutcome,
        accumulator: &mut RunAccumulator,
    ) {
        let summary = outcome.record.summary.clone().unwrap_or_default();
        let digest = self.one_line_digest(&summary, accumulator);
        let metadata = match outcome.record.metadata.clone() {
            Some(metadata) => metadata,
            None => {
                outcome.record_issue(Stage::Publish, "no metadata available");
                return;
            }
        };

        match publisher.publish(&metadata, &summary, &digest, accumulator) {
            Ok(()) => outcome.mark(Stage::Publish),
            Err(err) => outcome.record_issue(Stage::Publish, err.to_string()),
        }
    }

    /// One-line abstractive digest used as the record's essence column.
    fn one_line_digest(&self, summary: &str, accumulator: &mut RunAccumulator) -> String {
        let result = self.gateway.generate(
            &GenerationRequest {
                instruction: "Summarize the following text in one line. Like \"Investigates the \
                    relationship between chinese and european foreign politics with NLP methods\" \
                    or \"Analyzes the impact of climate change on the global economy\"."
                    .to_string(),
                prompt: summary.to_string(),
                model: self.settings.summarizer_model.clone(),
                ..GenerationRequest::default()
            },
            accumulator,
        );
        result.text.unwrap_or_default()
    }

    fn choose_voice(&self) -> String {
        if self.settings.tts_voice == VOICE_SHUFFLE {
            VOICE_OPTIONS
                .choose(&mut rand::thread_rng())
                .unwrap_or(&VOICE_OPTIONS[0])
                .to_string()
        } else {
            self.settings.tts_voice.clone()
        }
    }
}

/// Suffix appended to prompts when the output language is not the default.
pub fn language_suffix(language: &str) -> String {
    if language == "English" {
        String::new()
    } else {
        format!(" Please answer in {language}.")
    }
}

fn spoken_register_instruction(language: &str) -> String {
    format!(
        "You are an experienced researcher with years of expertise in transforming complex \
         content into audio content for an interested audience. Your task is to convert the \
         following document into a compelling, naturally-flowing text.\n\
         Please consider these elements:\n\
         - Transform formal language into natural, spoken language\n\
         - Maintain a conversational yet professional tone\n\
         - Do not exaggerate or hype up the content; stay professional, authentic and engaging\n\
         - Keep all relevant information from the document\n\
         - Please talk in {language}"
    )
}

/// Output-safe base name: NFKD-normalized, ASCII-only, spaces as underscores.
pub fn safe_base_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    stem.nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .replace(' ', "_")
}
