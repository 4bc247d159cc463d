use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use papercast::error::PipelineError;
use papercast::extract::TextSource;
use papercast::gateway::{
    CompletionRequest, CompletionResponse, ModelClient, SpeechRequest, Usage,
};
use papercast::settings::Settings;

mod batch_flow;
mod metadata_extraction;

/// Temp workspace with input/output directories and ready-to-run settings.
pub struct PipelineHarness {
    workspace: TempDir,
}

impl PipelineHarness {
    pub fn new() -> Self {
        let workspace = TempDir::new().expect("failed to create temp workspace");
        fs::create_dir_all(workspace.path().join("papers")).expect("input dir");
        Self { workspace }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.workspace.path().join("papers")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.workspace.path().join("output")
    }

    /// Baseline settings: summaries on, everything else off.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.api_key = "sk-test".to_string();
        settings.input_dir = self.input_dir();
        settings.output_dir = self.output_dir();
        settings.create_audio = false;
        settings
    }

    /// Creates a placeholder PDF file; its text comes from the fixture source.
    pub fn add_pdf(&self, name: &str) -> PathBuf {
        let path = self.input_dir().join(name);
        fs::write(&path, b"%PDF-1.4 placeholder").expect("write placeholder pdf");
        path
    }
}

/// Scripted response for one completion call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    WithAudio { text: String, audio_b64: String },
    Fail,
}

/// Model collaborator double: records every request, replays a script, and
/// falls back to a fixed default text once the script is exhausted.
pub struct FakeModelClient {
    completions: Mutex<Vec<CompletionRequest>>,
    speeches: Mutex<Vec<SpeechRequest>>,
    script: Mutex<VecDeque<ScriptedResponse>>,
    default_text: String,
    usage: Usage,
}

impl FakeModelClient {
    pub fn returning(default_text: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), default_text)
    }

    pub fn scripted(script: Vec<ScriptedResponse>, default_text: &str) -> Arc<Self> {
        Arc::new(Self {
            completions: Mutex::new(Vec::new()),
            speeches: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            default_text: default_text.to_string(),
            usage: Usage {
                prompt_units: 1_000_000,
                completion_units: 1_000_000,
            },
        })
    }

    pub fn completions(&self) -> Vec<CompletionRequest> {
        self.completions.lock().expect("completions lock").clone()
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().expect("completions lock").len()
    }

    pub fn speeches(&self) -> Vec<SpeechRequest> {
        self.speeches.lock().expect("speeches lock").clone()
    }
}

impl ModelClient for FakeModelClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, PipelineError> {
        self.completions
            .lock()
            .expect("completions lock")
            .push(request.clone());
        match self.script.lock().expect("script lock").pop_front() {
            Some(ScriptedResponse::Fail) => {
                Err(PipelineError::Generation("scripted failure".to_string()))
            }
            Some(ScriptedResponse::WithAudio { text, audio_b64 }) => Ok(CompletionResponse {
                text: Some(text),
                audio_data: Some(audio_b64),
                usage: self.usage,
            }),
            Some(ScriptedResponse::Text(text)) => Ok(CompletionResponse {
                text: Some(text),
                audio_data: None,
                usage: self.usage,
            }),
            None => Ok(CompletionResponse {
                text: Some(self.default_text.clone()),
                audio_data: None,
                usage: self.usage,
            }),
        }
    }

    fn speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, PipelineError> {
        self.speeches
            .lock()
            .expect("speeches lock")
            .push(request.clone());
        Ok(vec![0x49, 0x44, 0x33, 0x04])
    }
}

/// Text-extraction double keyed by file name; unknown files fail like an
/// unreadable document would.
#[derive(Default)]
pub struct FixtureTextSource {
    pages: HashMap<String, Vec<String>>,
}

impl FixtureTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: &str, text: &str) -> Self {
        self.pages
            .insert(file_name.to_string(), vec![text.to_string()]);
        self
    }
}

impl TextSource for FixtureTextSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, PipelineError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.pages
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::Extraction {
                path: path.to_path_buf(),
                message: "fixture has no text for this file".to_string(),
            })
    }
}
