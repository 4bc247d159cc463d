//! Single entry point for every language-model call.
//!
//! The gateway computes token counts, resolves price factors, dispatches to
//! the chat or dedicated-speech endpoint, persists requested outputs, and
//! books the call's cost into the run accumulator. Failures never escape:
//! they are logged and surfaced as an empty [`GenerationResult`], leaving the
//! caller to decide whether the paper can continue without that output.

pub mod client;
pub mod pricing;
pub mod tokens;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::extract::truncate_chars;
use crate::pipeline::RunAccumulator;
use crate::settings::Settings;

pub use client::{
    AudioSpec, CompletionRequest, CompletionResponse, ModelClient, OpenAiClient, SpeechRequest,
    Usage,
};
pub use tokens::count_tokens;

/// Character ceiling of the dedicated speech endpoint.
const TTS_INPUT_LIMIT: usize = 4096;

/// Capability class derived from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Chat-style model with text output.
    Chat,
    /// Chat-style model that can emit an audio payload alongside text.
    AudioPreview,
    /// Dedicated text-to-speech model.
    Speech,
}

impl ModelKind {
    pub fn classify(model: &str) -> Self {
        if model.contains("tts") {
            ModelKind::Speech
        } else if model.contains("audio-preview") {
            ModelKind::AudioPreview
        } else {
            ModelKind::Chat
        }
    }

    fn output_modality(self) -> &'static str {
        match self {
            ModelKind::AudioPreview => "audio",
            _ => "text",
        }
    }
}

/// One generation request, independent of the underlying endpoint.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub instruction: String,
    pub prompt: String,
    pub model: String,
    pub voice: Option<String>,
    pub format: Option<String>,
    /// Output file path without extension; `.txt` and/or the audio format
    /// extension are appended by the gateway.
    pub target: Option<PathBuf>,
}

/// Outcome of a generation call. Empty on failure.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: Option<String>,
    pub audio_file: Option<PathBuf>,
}

impl GenerationResult {
    fn failed() -> Self {
        Self::default()
    }

    pub fn is_failure(&self) -> bool {
        self.text.is_none() && self.audio_file.is_none()
    }
}

/// Gateway over one [`ModelClient`].
pub struct ModelGateway<'a> {
    settings: &'a Settings,
    client: Arc<dyn ModelClient>,
}

impl<'a> ModelGateway<'a> {
    pub fn new(settings: &'a Settings, client: Arc<dyn ModelClient>) -> Self {
        Self { settings, client }
    }

    /// Issues one generation call and books its cost on success.
    ///
    /// Any failure (pricing lookup, network, malformed response, decode,
    /// file write) is logged and returned as an empty result; nothing is
    /// booked for failed calls.
    pub fn generate(
        &self,
        request: &GenerationRequest,
        accumulator: &mut RunAccumulator,
    ) -> GenerationResult {
        let kind = ModelKind::classify(&request.model);
        let input_tokens =
            tokens::count_tokens(&format!("{}{}", request.prompt, request.instruction));
        info!(
            model = %request.model,
            voice = request.voice.as_deref().unwrap_or("-"),
            format = request.format.as_deref().unwrap_or("-"),
            input_tokens,
            "dispatching generation request"
        );

        let factors = match pricing::price_factors(&request.model, "text", kind.output_modality()) {
            Ok(factors) => factors,
            Err(err) => {
                error!(model = %request.model, error = %err, "pricing lookup failed");
                return GenerationResult::failed();
            }
        };

        match self.dispatch(request, kind, factors, accumulator) {
            Ok(result) => result,
            Err(err) => {
                error!(model = %request.model, error = %err, "generation call failed");
                GenerationResult::failed()
            }
        }
    }

    fn dispatch(
        &self,
        request: &GenerationRequest,
        kind: ModelKind,
        (input_factor, output_factor): (f64, f64),
        accumulator: &mut RunAccumulator,
    ) -> Result<GenerationResult, PipelineError> {
        match kind {
            ModelKind::Speech => self.synthesize(request, input_factor, accumulator),
            ModelKind::Chat | ModelKind::AudioPreview => {
                self.complete(request, kind, input_factor, output_factor, accumulator)
            }
        }
    }

    fn complete(
        &self,
        request: &GenerationRequest,
        kind: ModelKind,
        input_factor: f64,
        output_factor: f64,
        accumulator: &mut RunAccumulator,
    ) -> Result<GenerationResult, PipelineError> {
        let (modalities, audio) = match kind {
            ModelKind::AudioPreview => {
                let voice = request.voice.clone().unwrap_or_else(|| "alloy".to_string());
                let format = request
                    .format
                    .clone()
                    .unwrap_or_else(|| self.settings.audio_extension().to_string());
                (
                    vec!["audio".to_string(), "text".to_string()],
                    Some(AudioSpec { voice, format }),
                )
            }
            _ => (Vec::new(), None),
        };

        let response = self.client.complete(&CompletionRequest {
            model: request.model.clone(),
            instruction: request.instruction.clone(),
            prompt: request.prompt.clone(),
            modalities,
            audio,
        })?;

        let mut result = GenerationResult {
            text: response.text.clone(),
            audio_file: None,
        };

        if let Some(target) = &request.target {
            if let Some(text) = &response.text {
                let path = path_with_extension(target, "txt");
                fs::write(&path, text)?;
            }
            if let (Some(data), Some(format)) = (&response.audio_data, &request.format) {
                let bytes = BASE64.decode(data).map_err(|err| {
                    PipelineError::Generation(format!("undecodable audio payload: {err}"))
                })?;
                let path = path_with_extension(target, format.trim_start_matches('.'));
                fs::write(&path, bytes)?;
                result.audio_file = Some(path);
            }
        }

        accumulator.add_cost(
            charge(response.usage.prompt_units, input_factor),
            charge(response.usage.completion_units, output_factor),
        );
        Ok(result)
    }

    fn synthesize(
        &self,
        request: &GenerationRequest,
        input_factor: f64,
        accumulator: &mut RunAccumulator,
    ) -> Result<GenerationResult, PipelineError> {
        let input = truncate_chars(&request.prompt, TTS_INPUT_LIMIT);
        if input.len() < request.prompt.len() {
            warn!(
                model = %request.model,
                "input exceeds the speech model's context window, truncating"
            );
        }

        let voice = request.voice.clone().unwrap_or_else(|| "alloy".to_string());
        let format = request
            .format
            .clone()
            .unwrap_or_else(|| self.settings.audio_extension().to_string());
        let bytes = self.client.speech(&SpeechRequest {
            model: request.model.clone(),
            voice,
            speed: self.settings.tts_speed,
            input: input.to_string(),
            format: format.trim_start_matches('.').to_string(),
        })?;

        let mut audio_file = None;
        if let Some(target) = &request.target {
            let path = path_with_extension(target, format.trim_start_matches('.'));
            fs::write(&path, &bytes)?;
            audio_file = Some(path);
        }

        // The speech endpoint reports no usage; billed units are characters.
        accumulator.add_cost(charge(input.chars().count() as u64, input_factor), 0.0);
        Ok(GenerationResult {
            text: Some(input.to_string()),
            audio_file,
        })
    }
}

fn path_with_extension(base: &Path, extension: &str) -> PathBuf {
    let mut path = base.as_os_str().to_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Cost contribution of `units` at a per-million `factor`, rounded to 4
/// decimal places like every other booked amount.
fn charge(units: u64, factor: f64) -> f64 {
    round4(units as f64 / 1_000_000.0 * factor)
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
