use std::collections::HashMap;

use crate::job::Job;
use crate::stages::{Stage, StageContext, StageInput, StageInputs, StageOutput};
use crate::store::{Artifact, ArtifactKind, ArtifactOrigin, ArtifactStore};
use crate::{PipelineResult, PublisherError};

/// Runs single stages against the artifact store.
///
/// The executor skips stages whose output already exists, resolves inputs,
/// bounds the collaborator call with the stage timeout and commits the output.
/// Output derived from fallback text stays in memory so a later run regenerates
/// it. It does not retry and does not apply failure policies.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    store: ArtifactStore,
}

impl StageExecutor {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run one stage.
    ///
    /// `fallbacks` holds stand-ins for upstream outputs that failed in this
    /// run; they take precedence over anything in the store.
    pub async fn run(
        &self,
        stage: &dyn Stage,
        job: &Job,
        fallbacks: &HashMap<ArtifactKind, Artifact>,
    ) -> PipelineResult<Artifact> {
        let output = stage.output();
        let location = self.store.location(job, output);

        if stage.is_satisfied(&self.store, job).await? {
            tracing::info!("{} already exists, skipping {}", output, stage.name());
            return Ok(Artifact {
                kind: output,
                location,
                produced_by: stage.name().to_string(),
                origin: ArtifactOrigin::Reused,
                fallback: None,
            });
        }

        let inputs = self.gather_inputs(stage, job, fallbacks).await?;
        let derived = inputs.has_fallback() && stage.resumable();
        let ctx = StageContext {
            job,
            store: &self.store,
            inputs,
        };

        tracing::info!("Running {}", stage.name());
        let produced = match tokio::time::timeout(stage.timeout(), stage.produce(&ctx)).await {
            Ok(result) => result?,
            Err(_) => {
                let waited = crate::utils::format_duration(stage.timeout().as_secs_f64());
                return Err(PublisherError::stage(
                    stage.name(),
                    stage.failure(format!("timed out after {}", waited)),
                ));
            }
        };

        if derived {
            tracing::warn!("{} was built from fallback input, not committing it", output);
            let data = match produced {
                StageOutput::Bytes(data) => data,
                StageOutput::Staged(staged) => tokio::fs::read(&staged)
                    .await
                    .map_err(|e| PublisherError::store("read", staged.to_path_buf(), e))?,
            };
            return Ok(Artifact {
                kind: output,
                location,
                produced_by: stage.name().to_string(),
                origin: ArtifactOrigin::Derived,
                fallback: Some(String::from_utf8_lossy(&data).into_owned()),
            });
        }

        let location = match produced {
            StageOutput::Bytes(data) => self.store.write(job, output, &data).await?,
            StageOutput::Staged(staged) => self.store.commit(job, output, staged)?,
        };

        Ok(Artifact {
            kind: output,
            location,
            produced_by: stage.name().to_string(),
            origin: ArtifactOrigin::Produced,
            fallback: None,
        })
    }

    async fn gather_inputs(
        &self,
        stage: &dyn Stage,
        job: &Job,
        fallbacks: &HashMap<ArtifactKind, Artifact>,
    ) -> PipelineResult<StageInputs> {
        let mut inputs = StageInputs::default();

        for kind in stage.inputs() {
            let fallback = fallbacks
                .get(&kind)
                .filter(|artifact| artifact.is_transient())
                .and_then(|artifact| artifact.fallback.clone());

            if let Some(text) = fallback {
                inputs.insert(kind, StageInput::Fallback(text));
            } else if self.store.exists(job, kind).await? {
                inputs.insert(kind, StageInput::Stored(self.store.location(job, kind)));
            } else {
                return Err(PublisherError::MissingInput {
                    stage: stage.name().to_string(),
                    kind,
                });
            }
        }

        Ok(inputs)
    }
}
