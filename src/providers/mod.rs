use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod ffmpeg;
pub mod ghost;
pub mod http_image;
pub mod ollama;
pub mod overlay;
pub mod whisper;
pub mod ytdlp;

use crate::config::Config;
use crate::CollaboratorError;

/// Result type returned by collaborators
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// PCM layout for the canonical audio artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTarget {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,
}

impl Default for AudioTarget {
    fn default() -> Self {
        // Whisper resamples to 16 kHz mono internally
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Draft submitted to the publishing backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPost {
    pub title: String,
    pub html: String,
    pub feature_image: String,
    pub codeinjection_head: String,
}

/// Confirmation returned after creating a draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftReceipt {
    pub id: String,
    pub url: Option<String>,
    pub status: String,
}

/// Downloads the audio track of a remote video
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Download into `scratch_dir` and return the downloaded file
    async fn fetch(&self, url: &str, scratch_dir: &Path) -> CollaboratorResult<PathBuf>;
}

/// Converts downloaded audio into the canonical PCM artifact
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path, target: AudioTarget) -> CollaboratorResult<()>;
}

/// Speech-to-text engine
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe `audio`, writing a plain-text transcript into `output_dir`
    async fn transcribe(&self, audio: &Path, output_dir: &Path) -> CollaboratorResult<PathBuf>;
}

/// Generative text backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> CollaboratorResult<String>;
}

/// Fetches remote images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CollaboratorResult<Vec<u8>>;
}

/// Overlays the play marker on a cover image
#[async_trait]
pub trait ImageCompositor: Send + Sync {
    async fn composite(&self, base: &[u8]) -> CollaboratorResult<Vec<u8>>;
}

/// Publishing backend
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload an image and return its public URL
    async fn upload_image(&self, data: Vec<u8>, filename: &str) -> CollaboratorResult<String>;

    async fn create_draft(&self, post: &DraftPost) -> CollaboratorResult<DraftReceipt>;
}

/// The set of collaborators a pipeline delegates to
#[derive(Clone)]
pub struct Providers {
    pub audio_source: Arc<dyn AudioSource>,
    pub transcoder: Arc<dyn Transcoder>,
    pub speech: Arc<dyn SpeechToText>,
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageFetcher>,
    pub compositor: Arc<dyn ImageCompositor>,
    /// Absent when no publishing backend is configured
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl Providers {
    /// Build the default command-line and HTTP collaborators from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tools = &config.tools;
        let client = reqwest::Client::builder()
            .user_agent(concat!("scribepress/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let publisher = match &config.ghost {
            Some(ghost) => Some(Arc::new(ghost::GhostPublisher::new(client.clone(), ghost)?) as Arc<dyn Publisher>),
            None => None,
        };

        Ok(Self {
            audio_source: Arc::new(ytdlp::YtDlpSource::new(&tools.yt_dlp)),
            transcoder: Arc::new(ffmpeg::FfmpegTranscoder::new(&tools.ffmpeg)),
            speech: Arc::new(whisper::WhisperCli::new(
                &tools.whisper,
                tools.whisper_model.clone(),
                tools.whisper_fail_on_stderr,
            )),
            text: Arc::new(ollama::OllamaGenerator::new(client.clone(), &config.generation.endpoint)),
            images: Arc::new(http_image::HttpImageFetcher::new(client)),
            compositor: Arc::new(overlay::PlayButtonCompositor::new(config.pipeline.overlay_scale, 90)),
            publisher,
        })
    }
}

/// Render a child process failure for error messages
pub(crate) fn describe_exit(tool: &str, output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());

    if stderr.is_empty() {
        format!("{} exited with {}", tool, code)
    } else {
        // Keep the tail, that is where the actual error usually is
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        format!("{} exited with {}: {}", tool, code, tail.join(" | "))
    }
}
