use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{collaborator, Stage, StageContext, StageOutput};
use crate::providers::SpeechToText;
use crate::store::ArtifactKind;
use crate::{CollaboratorError, PipelineResult, PublisherError};

/// Turns the canonical WAV into a plain-text transcript
pub struct TranscribeStage {
    speech: Arc<dyn SpeechToText>,
    timeout: Duration,
}

impl TranscribeStage {
    pub fn new(speech: Arc<dyn SpeechToText>, timeout: Duration) -> Self {
        Self { speech, timeout }
    }
}

#[async_trait]
impl Stage for TranscribeStage {
    fn name(&self) -> &str {
        "transcription"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::RawAudio]
    }

    fn output(&self) -> ArtifactKind {
        ArtifactKind::Transcript
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Transcription(message)
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        let audio = ctx
            .inputs
            .path(ArtifactKind::RawAudio)
            .ok_or_else(|| PublisherError::MissingInput {
                stage: self.name().to_string(),
                kind: ArtifactKind::RawAudio,
            })?;

        // Whisper names its output after the input, which is the canonical transcript
        // path; point it at scratch space and commit the text ourselves
        let scratch = ctx.scratch_dir()?;
        let transcript = collaborator(self, self.speech.transcribe(audio, scratch.path()).await)?;

        let text = tokio::fs::read(&transcript).await.map_err(|e| {
            PublisherError::stage(
                self.name(),
                self.failure(format!("cannot read {}: {}", transcript.display(), e)),
            )
        })?;

        if String::from_utf8_lossy(&text).trim().is_empty() {
            return Err(PublisherError::stage(
                self.name(),
                self.failure("speech-to-text produced an empty transcript".to_string()),
            ));
        }

        Ok(StageOutput::Bytes(text))
    }
}
