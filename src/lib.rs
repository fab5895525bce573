//! Scribepress - turn a video into a draft blog post
//!
//! This library acquires audio from a video source, transcribes it, derives summary,
//! title, teaser and call-to-action text through a generative text endpoint, composes
//! a thumbnail and submits a draft to a Ghost blog. Every intermediate output is stored
//! in the job's working directory so an interrupted run can be resumed.

use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod providers;
pub mod stages;
pub mod store;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::{Config, ConfigError};
pub use job::Job;
pub use pipeline::{CancelHandle, Pipeline, RunReport};
pub use providers::Providers;
pub use store::{Artifact, ArtifactKind, ArtifactStore};

/// Result type used at the plumbing edges (CLI, provider construction)
pub type Result<T> = anyhow::Result<T>;

/// Result type used by the pipeline core
pub type PipelineResult<T> = std::result::Result<T, PublisherError>;

/// Error types for a pipeline run
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No source identifier in URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("Artifact {kind} not found at {}", path.display())]
    NotFound { kind: ArtifactKind, path: PathBuf },

    #[error("Stage '{stage}' is missing its {kind} input")]
    MissingInput { stage: String, kind: ArtifactKind },

    #[error("Stage '{stage}' failed: {cause}")]
    Stage {
        stage: String,
        #[source]
        cause: CollaboratorError,
    },

    #[error("Artifact store {operation} failed for {}: {source}", path.display())]
    Store {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline: {0}")]
    Graph(String),

    #[error("Job '{job}' was cancelled before stage '{stage}'")]
    Cancelled { job: String, stage: String },
}

impl PublisherError {
    pub fn stage(stage: impl Into<String>, cause: CollaboratorError) -> Self {
        Self::Stage {
            stage: stage.into(),
            cause,
        }
    }

    pub fn store(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidSource { .. } => 2,
            Self::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}

/// Failure reported by an external collaborator, classified by the stage family
/// that called it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Audio acquisition failed: {0}")]
    Acquisition(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Publishing failed: {0}")]
    Publish(String),
}
