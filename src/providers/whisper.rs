use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{describe_exit, CollaboratorResult, SpeechToText};
use crate::CollaboratorError;

/// Speech-to-text through the openai-whisper command line tool
pub struct WhisperCli {
    whisper_path: String,
    model: Option<String>,
    fail_on_stderr: bool,
}

impl WhisperCli {
    pub fn new(whisper_path: impl Into<String>, model: Option<String>, fail_on_stderr: bool) -> Self {
        Self {
            whisper_path: whisper_path.into(),
            model,
            fail_on_stderr,
        }
    }

    fn command(&self, audio: &Path, output_dir: &Path) -> Command {
        let mut command = Command::new(&self.whisper_path);
        command
            .arg(audio)
            .arg("--output_dir")
            .arg(output_dir)
            .args(["--output_format", "txt", "--verbose", "False"]);

        if let Some(model) = &self.model {
            command.arg("--model").arg(model);
        }

        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SpeechToText for WhisperCli {
    async fn transcribe(&self, audio: &Path, output_dir: &Path) -> CollaboratorResult<PathBuf> {
        tracing::debug!("Transcribing {}", audio.display());

        let output = self
            .command(audio, output_dir)
            .output()
            .await
            .map_err(|e| {
                CollaboratorError::Transcription(format!("failed to run {}: {}", self.whisper_path, e))
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Transcription(describe_exit("whisper", &output)));
        }

        if self.fail_on_stderr && !output.stderr.is_empty() {
            return Err(CollaboratorError::Transcription(format!(
                "whisper reported errors: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stem = audio
            .file_stem()
            .ok_or_else(|| CollaboratorError::Transcription("audio path has no file name".to_string()))?;
        let transcript = output_dir.join(format!("{}.txt", stem.to_string_lossy()));

        if !transcript.is_file() {
            return Err(CollaboratorError::Transcription(format!(
                "whisper did not write {}",
                transcript.display()
            )));
        }

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cli: &WhisperCli) -> Vec<String> {
        cli.command(Path::new("/work/abc123.wav"), Path::new("/work/tmp"))
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_line() {
        let cli = WhisperCli::new("whisper", None, false);
        assert_eq!(
            args(&cli),
            vec!["/work/abc123.wav", "--output_dir", "/work/tmp", "--output_format", "txt", "--verbose", "False"]
        );
    }

    #[test]
    fn test_command_line_with_model() {
        let cli = WhisperCli::new("whisper", Some("small.en".to_string()), false);
        let args = args(&cli);
        assert_eq!(&args[args.len() - 2..], ["--model", "small.en"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_transcription_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = WhisperCli::new("/nonexistent/whisper-binary", None, false);
        let err = cli
            .transcribe(&dir.path().join("abc123.wav"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Transcription(_)));
    }
}
