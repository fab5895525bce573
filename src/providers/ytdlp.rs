use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{describe_exit, AudioSource, CollaboratorResult};
use crate::CollaboratorError;

/// File stem yt-dlp writes into the scratch directory
const DOWNLOAD_STEM: &str = "source";

/// Audio downloader backed by yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
}

impl YtDlpSource {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Find the file yt-dlp produced; the extension depends on the stream it picked
    async fn find_download(&self, scratch_dir: &Path) -> CollaboratorResult<PathBuf> {
        let mut entries = tokio::fs::read_dir(scratch_dir)
            .await
            .map_err(|e| CollaboratorError::Acquisition(format!("cannot read download directory: {}", e)))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_download = path
                .file_stem()
                .map(|stem| stem == DOWNLOAD_STEM)
                .unwrap_or(false);
            let is_partial = path
                .extension()
                .map(|ext| ext == "part" || ext == "ytdl")
                .unwrap_or(false);

            if is_download && !is_partial {
                return Ok(path);
            }
        }

        Err(CollaboratorError::Acquisition(
            "yt-dlp finished without producing an audio file".to_string(),
        ))
    }
}

#[async_trait]
impl AudioSource for YtDlpSource {
    async fn fetch(&self, url: &str, scratch_dir: &Path) -> CollaboratorResult<PathBuf> {
        tracing::debug!("Downloading audio for: {}", url);

        let template = scratch_dir
            .join(format!("{}.%(ext)s", DOWNLOAD_STEM))
            .to_string_lossy()
            .into_owned();
        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--output",
                template.as_str(),
                // Best audio-only stream, ffmpeg handles the conversion afterwards
                "--format",
                "bestaudio/best",
                "--no-playlist",
                "--no-progress",
                "--quiet",
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CollaboratorError::Acquisition(format!("failed to run {}: {}", self.yt_dlp_path, e))
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Acquisition(describe_exit("yt-dlp", &output)));
        }

        self.find_download(scratch_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_find_download_skips_partial_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("source.webm.part"), b"..").unwrap();
        std::fs::write(dir.path().join("source.webm"), b"audio").unwrap();

        let source = YtDlpSource::new("yt-dlp");
        let found = source.find_download(dir.path()).await.unwrap();
        assert_eq!(found, dir.path().join("source.webm"));
    }

    #[tokio::test]
    async fn test_find_download_without_output() {
        let dir = TempDir::new().unwrap();
        let source = YtDlpSource::new("yt-dlp");
        let err = source.find_download(dir.path()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_acquisition_error() {
        let dir = TempDir::new().unwrap();
        let source = YtDlpSource::new("/nonexistent/yt-dlp-binary");
        let err = source
            .fetch("https://video.example/watch?v=abc123", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Acquisition(_)));
    }
}
