pub mod batch;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod metadata;
pub mod notify;
pub mod pipeline;
pub mod portfolio;
pub mod publish;
pub mod settings;

// Re-export commonly used types for convenience.
pub use batch::{BatchOrchestrator, RunReport};
pub use error::PipelineError;
pub use gateway::{GenerationRequest, GenerationResult, ModelClient, ModelGateway, OpenAiClient};
pub use metadata::{Metadata, MetadataExtractor};
pub use pipeline::{PaperProcessor, PaperRecord, RunAccumulator, RunSnapshot};
pub use settings::{load_settings, Settings};
