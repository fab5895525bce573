use async_trait::async_trait;
use pulldown_cmark::{html, Parser};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{collaborator, require_text, FailurePolicy, Stage, StageContext, StageOutput, TextField};
use crate::providers::{DraftPost, DraftReceipt, Publisher};
use crate::store::ArtifactKind;
use crate::{CollaboratorError, PipelineResult, PublisherError};

/// Receipt written after a draft has been created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub title: String,
    pub feature_image: String,
    pub draft: DraftReceipt,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Text sections of the article, in reading order
#[derive(Debug, Clone, Default)]
pub struct ArticleParts {
    pub title: Option<String>,
    pub source_url: String,
    pub teaser: Option<String>,
    pub summary: String,
    pub cta: Option<String>,
}

impl ArticleParts {
    /// Markdown body: title, source link, teaser, summary, call to action
    pub fn markdown(&self) -> String {
        [
            self.title.as_deref(),
            Some(self.source_url.as_str()),
            self.teaser.as_deref(),
            Some(self.summary.as_str()),
            self.cta.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    pub fn html(&self) -> String {
        let markdown = self.markdown();
        let mut rendered = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut rendered, Parser::new(&markdown));
        rendered
    }
}

/// Uploads the composed image and submits the article as a draft.
///
/// There is no way to tell locally whether a draft already exists, so this
/// stage runs on every invocation; resuming a finished job creates another
/// draft.
pub struct PublishStage {
    publisher: Arc<dyn Publisher>,
    fields: Vec<TextField>,
    code_injection_head: String,
    timeout: Duration,
}

impl PublishStage {
    /// `fields` lists the generated fields present in this pipeline
    pub fn new(
        publisher: Arc<dyn Publisher>,
        fields: Vec<TextField>,
        code_injection_head: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            fields,
            code_injection_head: code_injection_head.into(),
            timeout,
        }
    }

    async fn optional_field(&self, ctx: &StageContext<'_>, field: TextField) -> PipelineResult<Option<String>> {
        if !ctx.inputs.contains(field.output()) {
            return Ok(None);
        }
        require_text(self, ctx, field.output()).await.map(Some)
    }
}

#[async_trait]
impl Stage for PublishStage {
    fn name(&self) -> &str {
        "publication"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        let mut inputs = vec![ArtifactKind::ComposedThumbnail, ArtifactKind::SummaryText];
        inputs.extend(
            self.fields
                .iter()
                .filter(|field| **field != TextField::Summary)
                .map(|field| field.output()),
        );
        inputs
    }

    fn output(&self) -> ArtifactKind {
        ArtifactKind::PublishedPost
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Report
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Publish(message)
    }

    // Every run creates a new draft; the receipt is only a record
    fn resumable(&self) -> bool {
        false
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        let image = match ctx.inputs.bytes(ArtifactKind::ComposedThumbnail).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                return Err(PublisherError::MissingInput {
                    stage: self.name().to_string(),
                    kind: ArtifactKind::ComposedThumbnail,
                })
            }
            Err(e) => return Err(PublisherError::stage(self.name(), self.failure(e.to_string()))),
        };

        let parts = ArticleParts {
            title: self.optional_field(ctx, TextField::Title).await?,
            source_url: ctx.job.source_url().to_string(),
            teaser: self.optional_field(ctx, TextField::Teaser).await?,
            summary: require_text(self, ctx, ArtifactKind::SummaryText).await?,
            cta: self.optional_field(ctx, TextField::Cta).await?,
        };

        // A failed title generation must not become the post title
        let title = match &parts.title {
            Some(title) if !ctx.inputs.is_fallback(ArtifactKind::TitleText) => title.trim().to_string(),
            _ => ctx.job.source_id().to_string(),
        };

        let filename = ArtifactKind::ComposedThumbnail.file_name(ctx.job.source_id());
        let feature_image = collaborator(self, self.publisher.upload_image(image, &filename).await)?;

        let draft = DraftPost {
            title: title.clone(),
            html: parts.html(),
            feature_image: feature_image.clone(),
            codeinjection_head: self.code_injection_head.clone(),
        };
        let receipt = collaborator(self, self.publisher.create_draft(&draft).await)?;

        let record = PublishedPost {
            title,
            feature_image,
            draft: receipt,
            published_at: chrono::Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| PublisherError::stage(self.name(), self.failure(format!("cannot encode receipt: {}", e))))?;

        Ok(StageOutput::Bytes(json))
    }
}
