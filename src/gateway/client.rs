//! Blocking HTTP client for an OpenAI-style generation API.
//!
//! The [`ModelClient`] trait is the seam between the gateway and the wire:
//! tests swap in scripted implementations, production uses [`OpenAiClient`].

use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::settings::Settings;

/// Voice and container format for chat models with audio output.
#[derive(Debug, Clone)]
pub struct AudioSpec {
    pub voice: String,
    pub format: String,
}

/// One chat-completion style request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub instruction: String,
    pub prompt: String,
    /// Output modalities, e.g. `["audio", "text"]`; empty for plain text.
    pub modalities: Vec<String>,
    pub audio: Option<AudioSpec>,
}

/// Unit counts reported by the API, used for cost accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_units: u64,
    pub completion_units: u64,
}

/// Decoded chat-completion response.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: Option<String>,
    /// Base64 audio payload for audio-capable chat models.
    pub audio_data: Option<String>,
    pub usage: Usage,
}

/// One dedicated text-to-speech request.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub input: String,
    pub format: String,
}

/// Language-model collaborator contract.
pub trait ModelClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, PipelineError>;

    /// Synthesizes speech and returns the raw audio bytes.
    fn speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, PipelineError>;
}

/// Production client talking to an OpenAI-compatible endpoint.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key: settings.api_key.clone(),
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ModelClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, PipelineError> {
        let mut payload = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.instruction },
                { "role": "user", "content": request.prompt },
            ],
        });
        if !request.modalities.is_empty() {
            payload["modalities"] = json!(request.modalities);
        }
        if let Some(audio) = &request.audio {
            payload["audio"] = json!({ "voice": audio.voice, "format": audio.format });
        }

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "model endpoint returned {status}: {body}"
            )));
        }

        let body: Value = response.json()?;
        let message = &body["choices"][0]["message"];
        let text = message["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let audio_data = message["audio"]["data"].as_str().map(str::to_string);
        let usage = Usage {
            prompt_units: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_units: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };
        Ok(CompletionResponse {
            text,
            audio_data,
            usage,
        })
    }

    fn speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, PipelineError> {
        let payload = json!({
            "model": request.model,
            "voice": request.voice,
            "speed": request.speed,
            "input": request.input,
            "response_format": request.format,
        });

        let response = self
            .http
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "speech endpoint returned {status}: {body}"
            )));
        }
        Ok(response.bytes()?.to_vec())
    }
}
