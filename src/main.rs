use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::MultiProgress;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scribepress::cli::{Cli, Commands};
use scribepress::config::{Config, ConfigError};
use scribepress::pipeline::{plan, CancelHandle};
use scribepress::{output, utils, ArtifactStore, Job, Providers, PublisherError};

/// Exit code after the user aborts with a second interrupt
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            exit_code(&err)
        }
    };

    std::process::exit(code);
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose { "scribepress=debug" } else { "scribepress=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr, stdout is reserved for reports
    let json = cli.json_logs.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let plain = (!cli.json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry().with(filter).with(json).with(plain).init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<PublisherError>() {
        return err.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Publish {
            url,
            config,
            skip_publish,
            format,
        } => {
            let config = Config::load(config.as_deref()).await?;
            config.validate(!skip_publish)?;

            let job = Job::create(&url, &config.source.id_param, &config.directory).await?;
            tracing::info!("Processing {} in {}", job.source_id(), job.working_dir().display());

            let providers = Providers::from_config(&config)?;
            let store = ArtifactStore::new(job.working_dir());
            let mut pipeline = plan::standard(&config, &providers, store, skip_publish)?;
            if !cli.quiet {
                pipeline = pipeline.with_progress(MultiProgress::new());
            }

            let report = tokio::select! {
                result = pipeline.run(&job) => result?,
                _ = interrupted(pipeline.cancel_handle()) => {
                    tracing::warn!("Aborted, running stages were stopped");
                    return Ok(EXIT_INTERRUPTED);
                }
            };

            println!("{}", output::format_report(&report, &format)?);
            Ok(0)
        }
        Commands::Status { url, config, format } => {
            let config = Config::load(config.as_deref()).await?;
            if config.directory.as_os_str().is_empty() {
                return Err(ConfigError::Missing("directory").into());
            }

            let job = Job::from_url(&url, &config.source.id_param, &config.directory)?;
            let inventory = ArtifactStore::new(job.working_dir()).inventory(&job).await;

            println!("{}", output::format_inventory(&job, &inventory, &format)?);
            Ok(0)
        }
        Commands::Check { config } => {
            let tools = match config {
                Some(path) => Config::load(Some(&path)).await?.tools,
                None => match Config::load(None).await {
                    Ok(config) => config.tools,
                    Err(err) => {
                        tracing::debug!("Using default tool names: {}", err);
                        Default::default()
                    }
                },
            };

            let missing = utils::check_dependencies(&tools).await;
            if missing.is_empty() {
                println!("{} all external tools are available", style("✓").green());
                return Ok(0);
            }

            eprintln!("{}", style("Missing external tools:").yellow());
            for tool in missing {
                eprintln!("   • {}", tool);
            }
            Ok(1)
        }
        Commands::Config { config, show } => {
            let config = Config::load(config.as_deref()).await?;
            config.validate(config.ghost.is_some())?;

            if show {
                config.display();
            } else {
                println!("{} configuration is valid", style("✓").green());
            }
            Ok(0)
        }
    }
}

/// Resolves on the second Ctrl-C; the first one only stops new stages
async fn interrupted(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    tracing::warn!("Interrupted, waiting for running stages (press Ctrl-C again to abort)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
