use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::DEFAULT_ID_PARAM;
use crate::providers::ollama::DEFAULT_ENDPOINT;
use crate::providers::AudioTarget;
use crate::stages::generate::PLACEHOLDER;

/// Errors raised while loading or validating configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("Configuration error: failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Configuration error: no config file found (tried {0})")]
    NotFound(String),

    #[error("Configuration error: missing required field '{0}'")]
    Missing(&'static str),

    #[error("Configuration error: invalid '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Working directory holding every artifact
    #[serde(default)]
    pub directory: PathBuf,

    /// Ghost Admin API credentials
    #[serde(default)]
    pub ghost: Option<GhostConfig>,

    /// Prompt templates; `{transcript}` is replaced with the sanitized input text
    #[serde(default)]
    pub prompts: PromptConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub source: SourceConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// PCM layout of the audio artifact
    #[serde(default)]
    pub audio: AudioTarget,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostConfig {
    /// Blog root URL
    pub url: String,

    /// Admin API key, `<id>:<hex secret>`
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    pub summary: Option<String>,
    pub title: Option<String>,
    pub teaser: Option<String>,
    pub cta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Ollama-compatible generate endpoint
    pub endpoint: String,

    pub model: String,

    /// Text used in place of a field whose generation failed
    pub fallback_text: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "llama3".to_string(),
            fallback_text: "Failed to generate summary".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Query parameter holding the video identifier
    pub id_param: String,

    /// Cover image location, `{id}` is replaced with the identifier
    pub thumbnail_url_template: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id_param: DEFAULT_ID_PARAM.to_string(),
            thumbnail_url_template: "https://img.youtube.com/vi/{id}/maxresdefault.jpg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,
    pub ffmpeg: String,
    pub whisper: String,

    /// Whisper model name (whisper's own default when unset)
    pub whisper_model: Option<String>,

    /// Treat any whisper stderr output as a failure
    pub whisper_fail_on_stderr: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            whisper: "whisper".to_string(),
            whisper_model: None,
            whisper_fail_on_stderr: false,
        }
    }
}

/// Per-stage collaborator timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub acquisition_secs: u64,
    pub transcription_secs: u64,
    pub generation_secs: u64,
    pub image_secs: u64,
    pub publish_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            acquisition_secs: 30 * 60,
            transcription_secs: 2 * 60 * 60,
            generation_secs: 5 * 60,
            image_secs: 60,
            publish_secs: 2 * 60,
        }
    }
}

impl TimeoutConfig {
    pub fn acquisition(&self) -> Duration {
        Duration::from_secs(self.acquisition_secs)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of stages in flight at once
    pub max_concurrent_stages: usize,

    /// Injected into the post head; hides the duplicated feature image
    pub code_injection_head: String,

    /// Play button size multiplier
    pub overlay_scale: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_stages: 4,
            code_injection_head: "<style>figure.gh-article-image {display:none;}</style>".to_string(),
            overlay_scale: 1.0,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the default locations
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = Self::config_path(path)?;

        let content = fs_err::read_to_string(&config_path).map_err(ConfigError::Read)?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;

        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Resolve the configuration file path
    fn config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // Current directory first for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("scribepress").join("config.yaml"));
        match user_config {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ConfigError::NotFound(format!(
                "{}, {}",
                local_config.display(),
                path.display()
            ))),
            None => Err(ConfigError::NotFound(local_config.display().to_string())),
        }
    }

    /// Validate configuration; publishing credentials are only required when
    /// the run will publish
    pub fn validate(&self, publishing: bool) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("directory"));
        }

        match self.prompts.summary.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => {}
            _ => return Err(ConfigError::Missing("prompts.summary")),
        }

        for (name, prompt) in self.prompt_templates() {
            if !prompt.contains(PLACEHOLDER) {
                tracing::warn!("Prompt '{}' has no {} placeholder, its input will be ignored", name, PLACEHOLDER);
            }
        }

        if publishing {
            let ghost = self.ghost.as_ref().ok_or(ConfigError::Missing("ghost"))?;
            if ghost.url.trim().is_empty() {
                return Err(ConfigError::Missing("ghost.url"));
            }
            if ghost.key.trim().is_empty() {
                return Err(ConfigError::Missing("ghost.key"));
            }
            validate_http_url("ghost.url", &ghost.url)?;
            if !ghost.key.contains(':') {
                return Err(ConfigError::Invalid {
                    field: "ghost.key",
                    message: "expected '<id>:<secret>'".to_string(),
                });
            }
        }

        validate_http_url("generation.endpoint", &self.generation.endpoint)?;

        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::Missing("generation.model"));
        }

        if self.source.id_param.is_empty() {
            return Err(ConfigError::Missing("source.id_param"));
        }

        if self.pipeline.max_concurrent_stages == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.max_concurrent_stages",
                message: "must be at least 1".to_string(),
            });
        }

        let scale = crate::providers::overlay::SCALE_RANGE;
        if !scale.contains(&self.pipeline.overlay_scale) {
            return Err(ConfigError::Invalid {
                field: "pipeline.overlay_scale",
                message: format!("must be between {} and {}", scale.start(), scale.end()),
            });
        }

        let timeouts = &self.timeouts;
        let all_positive = [
            timeouts.acquisition_secs,
            timeouts.transcription_secs,
            timeouts.generation_secs,
            timeouts.image_secs,
            timeouts.publish_secs,
        ]
        .iter()
        .all(|secs| *secs > 0);
        if !all_positive {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                message: "every timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Configured prompt templates in pipeline order
    pub fn prompt_templates(&self) -> Vec<(&'static str, &str)> {
        [
            ("summary", &self.prompts.summary),
            ("title", &self.prompts.title),
            ("teaser", &self.prompts.teaser),
            ("cta", &self.prompts.cta),
        ]
        .into_iter()
        .filter_map(|(name, prompt)| prompt.as_deref().map(|p| (name, p)))
        .collect()
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Directory: {}", self.directory.display());
        match &self.ghost {
            Some(ghost) => {
                println!("  Ghost URL: {}", ghost.url);
                let key_id = ghost.key.split(':').next().unwrap_or_default();
                println!("  Ghost Key: {}:****", key_id);
            }
            None => println!("  Ghost: not configured"),
        }
        let prompts: Vec<&str> = self.prompt_templates().into_iter().map(|(name, _)| name).collect();
        println!("  Prompts: {}", prompts.join(", "));
        println!("  Model: {} via {}", self.generation.model, self.generation.endpoint);
        println!(
            "  Audio: {} Hz, {} channel(s)",
            self.audio.sample_rate, self.audio.channels
        );
        println!("  Max concurrent stages: {}", self.pipeline.max_concurrent_stages);
    }
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            field,
            message: "URL must use HTTP or HTTPS protocol".to_string(),
        });
    }

    Ok(())
}
