//! Pipeline stages.
//!
//! A stage declares the artifacts it reads, the single artifact it produces and
//! how its failures are treated. The executor in [`crate::pipeline`] handles
//! idempotency, timeouts and committing; stages only talk to their collaborator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{TempDir, TempPath};

pub mod acquire;
pub mod generate;
pub mod publish;
pub mod thumbnail;
pub mod transcribe;

pub use acquire::AcquireStage;
pub use generate::{GenerateStage, TextField};
pub use publish::PublishStage;
pub use thumbnail::{ComposeStage, ThumbnailStage};
pub use transcribe::TranscribeStage;

use crate::job::Job;
use crate::providers::CollaboratorResult;
use crate::store::{ArtifactKind, ArtifactStore};
use crate::{CollaboratorError, PipelineResult};

/// What the orchestrator does when a stage fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the job; nothing downstream runs
    Fatal,
    /// Substitute this text and carry on
    Fallback(String),
    /// Log and record the failure; the job still completes
    Report,
}

/// An input resolved for one stage execution
#[derive(Debug, Clone)]
pub enum StageInput {
    /// Committed artifact in the store
    Stored(PathBuf),
    /// Fallback text from an upstream stage that failed in this run, or text
    /// derived from such a fallback
    Fallback(String),
}

/// Inputs gathered by the executor before a stage runs
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    values: HashMap<ArtifactKind, StageInput>,
}

impl StageInputs {
    pub fn insert(&mut self, kind: ArtifactKind, input: StageInput) {
        self.values.insert(kind, input);
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn is_fallback(&self, kind: ArtifactKind) -> bool {
        matches!(self.values.get(&kind), Some(StageInput::Fallback(_)))
    }

    /// Whether any input is fallback text
    pub fn has_fallback(&self) -> bool {
        self.values.values().any(|input| matches!(input, StageInput::Fallback(_)))
    }

    /// Path of a stored input
    pub fn path(&self, kind: ArtifactKind) -> Option<&Path> {
        match self.values.get(&kind) {
            Some(StageInput::Stored(path)) => Some(path),
            _ => None,
        }
    }

    /// Text content of an input, if the stage declared it
    pub async fn text(&self, kind: ArtifactKind) -> std::io::Result<Option<String>> {
        match self.values.get(&kind) {
            Some(StageInput::Fallback(text)) => Ok(Some(text.clone())),
            Some(StageInput::Stored(path)) => {
                let data = tokio::fs::read(path).await?;
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            None => Ok(None),
        }
    }

    /// Raw bytes of a stored input
    pub async fn bytes(&self, kind: ArtifactKind) -> std::io::Result<Option<Vec<u8>>> {
        match self.path(kind) {
            Some(path) => tokio::fs::read(path).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Everything a stage can see while it runs
pub struct StageContext<'a> {
    pub job: &'a Job,
    pub store: &'a ArtifactStore,
    pub inputs: StageInputs,
}

impl StageContext<'_> {
    /// Temporary file a collaborator can write the output into
    pub fn stage_file(&self, kind: ArtifactKind) -> PipelineResult<TempPath> {
        self.store.stage_file(kind)
    }

    /// Temporary directory for collaborators that emit several files
    pub fn scratch_dir(&self) -> PipelineResult<TempDir> {
        self.store.scratch_dir()
    }
}

/// Output of a successful stage, committed by the executor
pub enum StageOutput {
    Bytes(Vec<u8>),
    /// A staged file already holding the output
    Staged(TempPath),
}

/// One unit of pipeline work
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logs and error context
    fn name(&self) -> &str;

    /// Artifacts read by the stage
    fn inputs(&self) -> Vec<ArtifactKind>;

    /// Artifacts that must exist before the stage starts but are not read
    fn after(&self) -> Vec<ArtifactKind> {
        Vec::new()
    }

    /// The artifact this stage produces
    fn output(&self) -> ArtifactKind;

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fatal
    }

    /// Upper bound for one collaborator invocation
    fn timeout(&self) -> Duration;

    /// Error used when the stage fails outside its collaborator (timeouts,
    /// unreadable inputs), classified like the collaborator's own failures
    fn failure(&self, message: String) -> CollaboratorError;

    /// Whether a committed output lets a later run skip this stage.
    ///
    /// Output of a resumable stage is only committed when none of its inputs
    /// were fallback text.
    fn resumable(&self) -> bool {
        true
    }

    /// Whether earlier output already satisfies this stage
    async fn is_satisfied(&self, store: &ArtifactStore, job: &Job) -> PipelineResult<bool> {
        if !self.resumable() {
            return Ok(false);
        }
        store.exists(job, self.output()).await
    }

    /// Run the collaborator
    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput>;
}

/// Read a declared text input or fail with the stage's own error class
pub(crate) async fn require_text(stage: &dyn Stage, ctx: &StageContext<'_>, kind: ArtifactKind) -> PipelineResult<String> {
    match ctx.inputs.text(kind).await {
        Ok(Some(text)) => Ok(text),
        Ok(None) => Err(crate::PublisherError::MissingInput {
            stage: stage.name().to_string(),
            kind,
        }),
        Err(e) => Err(crate::PublisherError::stage(
            stage.name(),
            stage.failure(format!("cannot read {}: {}", kind, e)),
        )),
    }
}

/// Wrap a collaborator result into the stage error shape
pub(crate) fn collaborator<T>(stage: &dyn Stage, result: CollaboratorResult<T>) -> PipelineResult<T> {
    result.map_err(|cause| crate::PublisherError::stage(stage.name(), cause))
}
