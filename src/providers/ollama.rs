use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CollaboratorResult, TextGenerator};
use crate::CollaboratorError;

/// Default Ollama generate endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    stream: bool,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Text generation through an Ollama-compatible `/api/generate` endpoint
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
}

impl OllamaGenerator {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, model: &str) -> CollaboratorResult<String> {
        tracing::debug!("Requesting {} chars of prompt from {} ({})", prompt.len(), self.endpoint, model);

        let request = GenerateRequest {
            model,
            stream: false,
            prompt,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Generation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Generation(format!(
                "endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Generation(format!("unreadable response: {}", e)))?;

        match body.response {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CollaboratorError::Generation("empty response".to_string())),
        }
    }
}
