use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{collaborator, require_text, FailurePolicy, Stage, StageContext, StageOutput};
use crate::providers::TextGenerator;
use crate::store::ArtifactKind;
use crate::{CollaboratorError, PipelineResult, PublisherError};

/// Token in a prompt template replaced with the stage input
pub const PLACEHOLDER: &str = "{transcript}";

/// The generated fields of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Summary,
    Title,
    Teaser,
    Cta,
}

impl TextField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "summary" => Some(TextField::Summary),
            "title" => Some(TextField::Title),
            "teaser" => Some(TextField::Teaser),
            "cta" => Some(TextField::Cta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextField::Summary => "summary",
            TextField::Title => "title",
            TextField::Teaser => "teaser",
            TextField::Cta => "cta",
        }
    }

    /// The summary reads the transcript, every other field reads the summary
    pub fn input(&self) -> ArtifactKind {
        match self {
            TextField::Summary => ArtifactKind::Transcript,
            _ => ArtifactKind::SummaryText,
        }
    }

    pub fn output(&self) -> ArtifactKind {
        match self {
            TextField::Summary => ArtifactKind::SummaryText,
            TextField::Title => ArtifactKind::TitleText,
            TextField::Teaser => ArtifactKind::TeaserText,
            TextField::Cta => ArtifactKind::CtaText,
        }
    }
}

/// Reduce text to ASCII letters and whitespace, one line, trimmed.
///
/// This is what the model sees in place of the placeholder, so it has to stay
/// stable across versions: punctuation and digits are dropped, line breaks become
/// single spaces.
pub fn sanitize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut in_line_break = false;

    for c in text.chars() {
        if c == '\n' || c == '\r' {
            if !in_line_break {
                cleaned.push(' ');
            }
            in_line_break = true;
            continue;
        }
        in_line_break = false;

        if c.is_ascii_alphabetic() || c.is_whitespace() {
            cleaned.push(c);
        }
    }

    cleaned.trim().to_string()
}

/// Substitute the sanitized input for the first placeholder in a template
pub fn render_prompt(template: &str, input: &str) -> String {
    template.replacen(PLACEHOLDER, &sanitize(input), 1)
}

/// One templated generation call
pub struct GenerateStage {
    field: TextField,
    template: String,
    model: String,
    fallback: String,
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl GenerateStage {
    pub fn new(
        field: TextField,
        template: impl Into<String>,
        model: impl Into<String>,
        fallback: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            field,
            template: template.into(),
            model: model.into(),
            fallback: fallback.into(),
            generator,
            timeout,
        }
    }

    pub fn field(&self) -> TextField {
        self.field
    }
}

#[async_trait]
impl Stage for GenerateStage {
    fn name(&self) -> &str {
        self.field.as_str()
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![self.field.input()]
    }

    fn output(&self) -> ArtifactKind {
        self.field.output()
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Fallback(self.fallback.clone())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, message: String) -> CollaboratorError {
        CollaboratorError::Generation(message)
    }

    async fn produce(&self, ctx: &StageContext<'_>) -> PipelineResult<StageOutput> {
        let input = require_text(self, ctx, self.field.input()).await?;
        let prompt = render_prompt(&self.template, &input);

        tracing::debug!("Generating {} with {}", self.field.as_str(), self.model);
        let text = collaborator(self, self.generator.generate(&prompt, &self.model).await)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PublisherError::stage(
                self.name(),
                self.failure("model returned an empty response".to_string()),
            ));
        }

        Ok(StageOutput::Bytes(text.as_bytes().to_vec()))
    }
}
