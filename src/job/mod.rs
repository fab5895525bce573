use std::path::{Path, PathBuf};
use url::Url;

use crate::{PipelineResult, PublisherError};

/// Query parameter that carries the video identifier on watch URLs
pub const DEFAULT_ID_PARAM: &str = "v";

/// One run of the pipeline for one source
#[derive(Debug, Clone)]
pub struct Job {
    source_url: String,
    source_id: String,
    working_dir: PathBuf,
}

impl Job {
    pub fn new(source_url: impl Into<String>, source_id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            source_id: source_id.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Build a job from a source URL without touching the filesystem
    pub fn from_url(url: &str, id_param: &str, working_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let source_id = extract_source_id(url, id_param)?;
        Ok(Self::new(url, source_id, working_dir))
    }

    /// Build a job and make sure its working directory exists
    pub async fn create(url: &str, id_param: &str, working_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let job = Self::from_url(url, id_param, working_dir)?;

        tokio::fs::create_dir_all(&job.working_dir)
            .await
            .map_err(|e| PublisherError::store("create working directory", &job.working_dir, e))?;

        tracing::debug!("Job {} uses {}", job.source_id, job.working_dir.display());
        Ok(job)
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Expand `{id}` in a URL template with this job's identifier
    pub fn expand(&self, template: &str) -> String {
        template.replace("{id}", &self.source_id)
    }
}

/// Pull the source identifier out of a URL's query string
pub fn extract_source_id(url: &str, id_param: &str) -> PipelineResult<String> {
    let invalid = |reason: &str| PublisherError::InvalidSource {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&format!("not a valid URL ({})", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("URL must use HTTP or HTTPS protocol"));
    }

    let id = parsed
        .query_pairs()
        .find(|(key, _)| key == id_param)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| invalid(&format!("missing '{}' query parameter", id_param)))?;

    if id.is_empty() {
        return Err(invalid(&format!("empty '{}' query parameter", id_param)));
    }

    // The identifier becomes a file name
    if id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(invalid("identifier is not usable as a file name"));
    }

    Ok(id)
}
