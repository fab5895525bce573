use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};

use crate::job::Job;
use crate::{PipelineResult, PublisherError};

/// Prefix for temporary files and directories inside a working directory
const STAGING_PREFIX: &str = ".scribepress-";

/// Every output a job can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawAudio,
    Transcript,
    SummaryText,
    TitleText,
    TeaserText,
    CtaText,
    Thumbnail,
    ComposedThumbnail,
    PublishedPost,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::RawAudio,
        ArtifactKind::Transcript,
        ArtifactKind::SummaryText,
        ArtifactKind::TitleText,
        ArtifactKind::TeaserText,
        ArtifactKind::CtaText,
        ArtifactKind::Thumbnail,
        ArtifactKind::ComposedThumbnail,
        ArtifactKind::PublishedPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::RawAudio => "raw audio",
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::SummaryText => "summary",
            ArtifactKind::TitleText => "title",
            ArtifactKind::TeaserText => "teaser",
            ArtifactKind::CtaText => "call to action",
            ArtifactKind::Thumbnail => "thumbnail",
            ArtifactKind::ComposedThumbnail => "composed thumbnail",
            ArtifactKind::PublishedPost => "published post",
        }
    }

    /// File name suffix appended to the source identifier.
    ///
    /// These names are the resume key for a working directory; changing one
    /// orphans every artifact already produced under the old name.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ArtifactKind::RawAudio => ".wav",
            ArtifactKind::Transcript => ".txt",
            ArtifactKind::SummaryText => "_summary.txt",
            ArtifactKind::TitleText => "_title.txt",
            ArtifactKind::TeaserText => "_teaser.txt",
            ArtifactKind::CtaText => "_cta.txt",
            ArtifactKind::Thumbnail => ".jpg",
            ArtifactKind::ComposedThumbnail => "_composed.jpg",
            ArtifactKind::PublishedPost => "_post.json",
        }
    }

    /// Canonical file name for a source identifier
    pub fn file_name(&self, source_id: &str) -> String {
        format!("{}{}", source_id, self.file_suffix())
    }

    /// Extension used for staged files so collaborators that sniff the
    /// output format (ffmpeg) pick the right muxer
    fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::RawAudio => ".wav",
            ArtifactKind::Thumbnail | ArtifactKind::ComposedThumbnail => ".jpg",
            ArtifactKind::PublishedPost => ".json",
            _ => ".txt",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an artifact came to be available for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Produced by this run and committed to the store
    Produced,
    /// Already present in the store, collaborator not invoked
    Reused,
    /// Stage failed and a fallback value stands in; never committed
    Fallback,
    /// Produced in this run from fallback input; never committed
    Derived,
}

/// A stage output available to downstream stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,

    /// Canonical location in the working directory
    pub location: PathBuf,

    /// Name of the stage that made it available
    pub produced_by: String,

    pub origin: ArtifactOrigin,

    /// In-memory text when `origin` is `Fallback` or `Derived`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl Artifact {
    /// Whether the artifact only exists for the current run
    pub fn is_transient(&self) -> bool {
        matches!(self.origin, ArtifactOrigin::Fallback | ArtifactOrigin::Derived)
    }
}

/// Filesystem-backed artifact storage rooted at a job's working directory.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a file at a canonical location is always complete.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical location for an artifact
    pub fn location(&self, job: &Job, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name(job.source_id()))
    }

    /// Check whether an artifact has been committed.
    ///
    /// Only a missing file counts as absent; any other stat failure is an
    /// error so a stage is never re-run over an artifact it cannot see.
    pub async fn exists(&self, job: &Job, kind: ArtifactKind) -> PipelineResult<bool> {
        let path = self.location(job, kind);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                tracing::warn!("Cannot check {} at {}: {}", kind, path.display(), e);
                Err(PublisherError::store("stat", path, e))
            }
        }
    }

    /// Read a committed artifact
    pub async fn read(&self, job: &Job, kind: ArtifactKind) -> PipelineResult<Vec<u8>> {
        let path = self.location(job, kind);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PublisherError::NotFound { kind, path })
            }
            Err(e) => Err(PublisherError::store("read", path, e)),
        }
    }

    /// Read a committed text artifact
    pub async fn read_text(&self, job: &Job, kind: ArtifactKind) -> PipelineResult<String> {
        let data = self.read(job, kind).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Atomically write an artifact, replacing any previous version
    pub async fn write(&self, job: &Job, kind: ArtifactKind, data: &[u8]) -> PipelineResult<PathBuf> {
        let staged = self.stage_file(kind)?;
        tokio::fs::write(&staged, data)
            .await
            .map_err(|e| PublisherError::store("write", staged.to_path_buf(), e))?;
        self.commit(job, kind, staged)
    }

    /// Reserve a temporary file next to the canonical location.
    ///
    /// The file is deleted when the returned path is dropped without being
    /// committed.
    pub fn stage_file(&self, kind: ArtifactKind) -> PipelineResult<TempPath> {
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(kind.extension())
            .tempfile_in(&self.root)
            .map(|file| file.into_temp_path())
            .map_err(|e| PublisherError::store("stage", &self.root, e))
    }

    /// Move a staged file into its canonical location
    pub fn commit(&self, job: &Job, kind: ArtifactKind, staged: TempPath) -> PipelineResult<PathBuf> {
        let location = self.location(job, kind);
        staged
            .persist(&location)
            .map_err(|e| PublisherError::store("commit", &location, e.error))?;

        tracing::debug!("Committed {} to {}", kind, location.display());
        Ok(location)
    }

    /// Temporary directory inside the working directory, removed on drop
    pub fn scratch_dir(&self) -> PipelineResult<TempDir> {
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| PublisherError::store("create scratch directory", &self.root, e))
    }

    /// Presence of every artifact kind for a job
    pub async fn inventory(&self, job: &Job) -> Vec<(ArtifactKind, bool)> {
        let mut entries = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            // Unreadable entries are listed as absent; exists() already logged why
            let present = self.exists(job, kind).await.unwrap_or(false);
            entries.push((kind, present));
        }
        entries
    }
}
