use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the paper pipeline.
///
/// Only `Configuration` aborts a run, and only before any file is touched.
/// Everything else is caught at the stage boundary that produced it: the
/// affected stage is skipped for the current paper and the batch continues.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("text extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("no price factors registered for model '{model}' ({input_modality} in, {output_modality} out)")]
    UnknownPricing {
        model: String,
        input_modality: String,
        output_modality: String,
    },

    #[error("portfolio generation failed: {0}")]
    Portfolio(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
