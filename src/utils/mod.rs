use crate::config::ToolsConfig;

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else if total_seconds == 0 && seconds > 0.0 {
        format!("{}ms", (seconds * 1000.0).round() as u64)
    } else {
        format!("{}s", secs)
    }
}

/// Check that the configured external tools can be started
pub async fn check_dependencies(tools: &ToolsConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&tools.yt_dlp, "--version").await {
        missing.push(format!("{} - required to download source audio", tools.yt_dlp));
    }

    if !check_command_available(&tools.ffmpeg, "-version").await {
        missing.push(format!("{} - required to transcode audio", tools.ffmpeg));
    }

    if !check_command_available(&tools.whisper, "--help").await {
        missing.push(format!("{} - required for speech-to-text", tools.whisper));
    }

    missing
}

/// Check if a command can be run
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[tokio::test]
    async fn test_missing_tools_are_reported() {
        let tools = ToolsConfig {
            yt_dlp: "scribepress-no-such-yt-dlp".to_string(),
            ffmpeg: "scribepress-no-such-ffmpeg".to_string(),
            whisper: "scribepress-no-such-whisper".to_string(),
            ..ToolsConfig::default()
        };

        let missing = check_dependencies(&tools).await;
        assert_eq!(missing.len(), 3);
        assert!(missing[0].starts_with("scribepress-no-such-yt-dlp"));
    }
}
