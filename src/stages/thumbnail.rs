use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{collaborator, Stage, StageContext, StageOutput};
use crate::providers::{ImageCompositor, ImageFetcher};
use crate::store::ArtifactKind;
use crate::{CollaboratorError, PipelineResult, PublisherError};

/// Downloads the cover image of the source
pub struct ThumbnailStage {
    fetcher: Arc<dyn ImageFetcher>,
    url_template: String,
    timeout: Duration,
}

impl ThumbnailStage {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Stage for ThumbnailStage {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        Vec::new()
    }

    /// Image work only starts once the job is known to have a transcript, so a
    /// fatal audio or transcription failure never costs an image download
    fn after(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Transcript]
    }

    fn output(&self) -> ArtifactKind {
        ArtifactKind::Thumbnail
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Image(message)
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        let url = ctx.job.expand(&self.url_template);
        let image = collaborator(self, self.fetcher.fetch(&url).await)?;
        Ok(StageOutput::Bytes(image))
    }
}

/// Overlays the play marker on the downloaded cover
pub struct ComposeStage {
    compositor: Arc<dyn ImageCompositor>,
    timeout: Duration,
}

impl ComposeStage {
    pub fn new(compositor: Arc<dyn ImageCompositor>, timeout: Duration) -> Self {
        Self { compositor, timeout }
    }
}

#[async_trait]
impl Stage for ComposeStage {
    fn name(&self) -> &str {
        "compose"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Thumbnail]
    }

    fn output(&self) -> ArtifactKind {
        ArtifactKind::ComposedThumbnail
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Image(message)
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        let base = match ctx.inputs.bytes(ArtifactKind::Thumbnail).await {
            Ok(Some(base)) => base,
            Ok(None) => {
                return Err(PublisherError::MissingInput {
                    stage: self.name().to_string(),
                    kind: ArtifactKind::Thumbnail,
                })
            }
            Err(e) => return Err(PublisherError::stage(self.name(), self.failure(e.to_string()))),
        };

        let composed = collaborator(self, self.compositor.composite(&base).await)?;
        Ok(StageOutput::Bytes(composed))
    }
}
