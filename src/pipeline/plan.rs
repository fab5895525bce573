use crate::config::{Config, ConfigError};
use crate::providers::Providers;
use crate::stages::{
    AcquireStage, ComposeStage, GenerateStage, PublishStage, TextField, ThumbnailStage, TranscribeStage,
};
use crate::store::ArtifactStore;
use crate::PipelineResult;

use super::Pipeline;

/// Build the video-to-draft pipeline.
///
/// Generation stages exist only for configured prompts; the summary prompt is
/// required. Publication is left out when `skip_publish` is set or no
/// publisher is configured.
pub fn standard(
    config: &Config,
    providers: &Providers,
    store: ArtifactStore,
    skip_publish: bool,
) -> PipelineResult<Pipeline> {
    let timeouts = &config.timeouts;

    let mut pipeline = Pipeline::new(store, config.pipeline.max_concurrent_stages)
        .with_stage(AcquireStage::new(
            providers.audio_source.clone(),
            providers.transcoder.clone(),
            config.audio,
            timeouts.acquisition(),
        ))
        .with_stage(TranscribeStage::new(providers.speech.clone(), timeouts.transcription()));

    let mut fields = Vec::new();
    for (name, template) in config.prompt_templates() {
        let Some(field) = TextField::from_name(name) else {
            continue;
        };
        fields.push(field);
        pipeline = pipeline.with_stage(GenerateStage::new(
            field,
            template,
            &config.generation.model,
            &config.generation.fallback_text,
            providers.text.clone(),
            timeouts.generation(),
        ));
    }
    if !fields.contains(&TextField::Summary) {
        return Err(ConfigError::Missing("prompts.summary").into());
    }

    pipeline = pipeline
        .with_stage(ThumbnailStage::new(
            providers.images.clone(),
            &config.source.thumbnail_url_template,
            timeouts.image(),
        ))
        .with_stage(ComposeStage::new(providers.compositor.clone(), timeouts.image()));

    match &providers.publisher {
        Some(_) if skip_publish => tracing::info!("Publication skipped"),
        Some(publisher) => {
            pipeline = pipeline.with_stage(PublishStage::new(
                publisher.clone(),
                fields,
                &config.pipeline.code_injection_head,
                timeouts.publish(),
            ));
        }
        None => tracing::info!("No publisher configured, stopping after composition"),
    }

    pipeline.validate()?;
    Ok(pipeline)
}
