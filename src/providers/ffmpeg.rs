use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{describe_exit, AudioTarget, CollaboratorResult, Transcoder};
use crate::CollaboratorError;

/// Transcoder backed by the ffmpeg binary
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path, target: AudioTarget) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            // Drop any video stream, decode to signed 16-bit little-endian PCM
            .args(["-vn", "-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(target.sample_rate.to_string())
            .arg("-ac")
            .arg(target.channels.to_string())
            .args(["-f", "wav"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path, target: AudioTarget) -> CollaboratorResult<()> {
        tracing::debug!(
            "Transcoding {} -> {} ({} Hz, {} ch)",
            input.display(),
            output.display(),
            target.sample_rate,
            target.channels
        );

        let result = self
            .command(input, output, target)
            .output()
            .await
            .map_err(|e| CollaboratorError::Acquisition(format!("failed to run {}: {}", self.ffmpeg_path, e)))?;

        if !result.status.success() {
            return Err(CollaboratorError::Acquisition(describe_exit("ffmpeg", &result)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let transcoder = FfmpegTranscoder::new("ffmpeg");
        let command = transcoder.command(
            Path::new("/tmp/in.webm"),
            Path::new("/tmp/out.wav"),
            AudioTarget {
                sample_rate: 22050,
                channels: 2,
            },
        );

        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[args.len() - 1], "/tmp/out.wav");
        assert!(args.windows(2).any(|w| w[0] == "-acodec" && w[1] == "pcm_s16le"));
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "22050"));
        assert!(args.windows(2).any(|w| w[0] == "-ac" && w[1] == "2"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/tmp/in.webm"));
    }
}
