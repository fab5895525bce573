//! Recording collaborators for pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use scribepress::config::Config;
use scribepress::pipeline::{plan, Pipeline};
use scribepress::providers::{
    AudioSource, AudioTarget, CollaboratorResult, DraftPost, DraftReceipt, ImageCompositor, ImageFetcher,
    Publisher, SpeechToText, TextGenerator, Transcoder,
};
use scribepress::{ArtifactStore, CollaboratorError, Job, Providers};

pub const URL: &str = "https://video.example/watch?v=abc123";
pub const TRANSCRIPT: &str = "Hello, World!\n123 this is the transcript";

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub struct FakeSource {
    log: CallLog,
}

#[async_trait]
impl AudioSource for FakeSource {
    async fn fetch(&self, _url: &str, scratch_dir: &Path) -> CollaboratorResult<PathBuf> {
        record(&self.log, "fetch");
        let path = scratch_dir.join("source.webm");
        tokio::fs::write(&path, b"webm audio").await.unwrap();
        Ok(path)
    }
}

pub struct FakeTranscoder {
    log: CallLog,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, input: &Path, output: &Path, target: AudioTarget) -> CollaboratorResult<()> {
        record(&self.log, "transcode");
        let mut data = format!("RIFF {} {} ", target.sample_rate, target.channels).into_bytes();
        data.extend(tokio::fs::read(input).await.unwrap());
        tokio::fs::write(output, data).await.unwrap();
        Ok(())
    }
}

pub struct FakeSpeech {
    log: CallLog,
    fail: bool,
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, audio: &Path, output_dir: &Path) -> CollaboratorResult<PathBuf> {
        record(&self.log, "transcribe");
        if self.fail {
            return Err(CollaboratorError::Transcription("whisper exited with 1".to_string()));
        }
        let stem = audio.file_stem().unwrap().to_string_lossy();
        let path = output_dir.join(format!("{}.txt", stem));
        tokio::fs::write(&path, TRANSCRIPT).await.unwrap();
        Ok(path)
    }
}

/// Answers `"<FIELD> ..."` prompts with `"Generated <field>"`
pub struct FakeText {
    log: CallLog,
    failing: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeText {
    /// Make generation fail for a field until [`FakeText::recover`]
    pub fn fail(&self, field: &str) {
        self.failing.lock().unwrap().push(field.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, prompt: &str, model: &str) -> CollaboratorResult<String> {
        assert_eq!(model, "llama3");
        let field = prompt.split_whitespace().next().unwrap_or_default().to_lowercase();
        record(&self.log, format!("generate:{}", field));
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.failing.lock().unwrap().contains(&field) {
            return Err(CollaboratorError::Generation("connection refused".to_string()));
        }
        Ok(format!("Generated {}\n", field))
    }
}

pub struct FakeImages {
    log: CallLog,
    pub urls: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch(&self, url: &str) -> CollaboratorResult<Vec<u8>> {
        record(&self.log, "image");
        self.urls.lock().unwrap().push(url.to_string());
        Ok(b"cover".to_vec())
    }
}

pub struct FakeCompositor {
    log: CallLog,
}

#[async_trait]
impl ImageCompositor for FakeCompositor {
    async fn composite(&self, base: &[u8]) -> CollaboratorResult<Vec<u8>> {
        record(&self.log, "compose");
        let mut composed = base.to_vec();
        composed.extend_from_slice(b"+play");
        Ok(composed)
    }
}

pub struct FakePublisher {
    log: CallLog,
    fail: Mutex<bool>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    pub drafts: Mutex<Vec<DraftPost>>,
}

impl FakePublisher {
    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn drafts(&self) -> Vec<DraftPost> {
        self.drafts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn upload_image(&self, data: Vec<u8>, filename: &str) -> CollaboratorResult<String> {
        record(&self.log, "upload");
        if *self.fail.lock().unwrap() {
            return Err(CollaboratorError::Publish("401 Unauthorized".to_string()));
        }
        self.uploads.lock().unwrap().push((filename.to_string(), data));
        Ok(format!("https://blog.example/content/images/{}", filename))
    }

    async fn create_draft(&self, post: &DraftPost) -> CollaboratorResult<DraftReceipt> {
        record(&self.log, "draft");
        let mut drafts = self.drafts.lock().unwrap();
        drafts.push(post.clone());
        Ok(DraftReceipt {
            id: format!("post-{}", drafts.len()),
            url: Some(format!("https://blog.example/p/post-{}/", drafts.len())),
            status: "draft".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub title_prompt: bool,
    pub fail_speech: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            title_prompt: true,
            fail_speech: false,
        }
    }
}

/// A working directory, configuration and recording collaborators
pub struct Harness {
    pub dir: TempDir,
    pub log: CallLog,
    pub config: Config,
    pub text: Arc<FakeText>,
    pub images: Arc<FakeImages>,
    pub publisher: Arc<FakePublisher>,
    providers: Providers,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let dir = TempDir::new().unwrap();
        let log: CallLog = Arc::default();

        let title = if options.title_prompt {
            "  title: \"TITLE {transcript}\"\n"
        } else {
            ""
        };
        let yaml = format!(
            "directory: {}\nprompts:\n  summary: \"SUMMARY {{transcript}}\"\n{}  teaser: \"TEASER {{transcript}}\"\n  cta: \"CTA {{transcript}}\"\n",
            dir.path().display(),
            title
        );
        let config = Config::from_yaml(&yaml).unwrap();

        let text = Arc::new(FakeText {
            log: log.clone(),
            failing: Mutex::default(),
            prompts: Mutex::default(),
        });
        let images = Arc::new(FakeImages {
            log: log.clone(),
            urls: Mutex::default(),
        });
        let publisher = Arc::new(FakePublisher {
            log: log.clone(),
            fail: Mutex::new(false),
            uploads: Mutex::default(),
            drafts: Mutex::default(),
        });

        let providers = Providers {
            audio_source: Arc::new(FakeSource { log: log.clone() }),
            transcoder: Arc::new(FakeTranscoder { log: log.clone() }),
            speech: Arc::new(FakeSpeech {
                log: log.clone(),
                fail: options.fail_speech,
            }),
            text: text.clone(),
            images: images.clone(),
            compositor: Arc::new(FakeCompositor { log: log.clone() }),
            publisher: Some(publisher.clone() as Arc<dyn Publisher>),
        };

        Self {
            dir,
            log,
            config,
            text,
            images,
            publisher,
            providers,
        }
    }

    pub async fn job(&self) -> Job {
        Job::create(URL, "v", self.dir.path()).await.unwrap()
    }

    pub fn pipeline(&self) -> Pipeline {
        plan::standard(&self.config, &self.providers, ArtifactStore::new(self.dir.path()), false).unwrap()
    }

    pub fn calls(&self, entry: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> usize {
        self.log.lock().unwrap().iter().position(|e| e == entry).unwrap()
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
