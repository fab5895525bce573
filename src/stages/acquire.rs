use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{collaborator, Stage, StageContext, StageOutput};
use crate::providers::{AudioSource, AudioTarget, Transcoder};
use crate::store::ArtifactKind;
use crate::{CollaboratorError, PipelineResult};

/// Downloads the source's audio and transcodes it to the canonical WAV
pub struct AcquireStage {
    source: Arc<dyn AudioSource>,
    transcoder: Arc<dyn Transcoder>,
    target: AudioTarget,
    timeout: Duration,
}

impl AcquireStage {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcoder: Arc<dyn Transcoder>,
        target: AudioTarget,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            transcoder,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl Stage for AcquireStage {
    fn name(&self) -> &str {
        "acquisition"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        Vec::new()
    }

    fn output(&self) -> ArtifactKind {
        ArtifactKind::RawAudio
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Acquisition(message)
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        // The download lives only as long as this call
        let scratch = ctx.scratch_dir()?;
        let downloaded = collaborator(self, self.source.fetch(ctx.job.source_url(), scratch.path()).await)?;

        tracing::info!("Converting downloaded audio to WAV");
        let staged = ctx.stage_file(ArtifactKind::RawAudio)?;
        collaborator(self, self.transcoder.transcode(&downloaded, &staged, self.target).await)?;

        Ok(StageOutput::Staged(staged))
    }
}
