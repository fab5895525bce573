use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scribepress",
    about = "Scribepress - Turn a video into a draft blog post",
    version,
    long_about = "Downloads the audio of a video, transcribes it with whisper, writes a summary, title, teaser and call to action with a local language model, adds a play button to the video thumbnail and submits everything to Ghost as a draft. Every step is stored in the working directory so an interrupted run picks up where it left off."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline for a video URL
    Publish {
        /// Video URL carrying the identifier as a query parameter
        #[arg(value_name = "URL")]
        url: String,

        /// Configuration file (defaults to ./config.yaml, then the user config directory)
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Stop after the thumbnail is composed
        #[arg(long)]
        skip_publish: bool,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show which artifacts exist for a video URL
    Status {
        #[arg(value_name = "URL")]
        url: String,

        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that the external tools can be started
    Check {
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Validate the configuration
    Config {
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON report
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
