use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::cli::OutputFormat;
use crate::job::Job;
use crate::pipeline::{RunReport, StageOutcome};
use crate::store::ArtifactKind;
use crate::utils::format_duration;

/// Spinner shown while a stage runs
pub fn stage_spinner(multi: &MultiProgress, stage: &str) -> ProgressBar {
    let spinner = multi.add(ProgressBar::new_spinner());
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Running {}...", stage));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

pub fn finish_spinner(spinner: &ProgressBar, stage: &str, outcome: &StageOutcome) {
    match outcome {
        StageOutcome::Produced => spinner.finish_with_message(format!("{} done", stage)),
        StageOutcome::Reused => spinner.finish_with_message(format!("{} already done", stage)),
        StageOutcome::Derived => spinner.finish_with_message(format!("{} done from fallback input", stage)),
        StageOutcome::Fallback { .. } => spinner.abandon_with_message(format!("{} fell back", stage)),
        StageOutcome::Failed { .. } => spinner.abandon_with_message(format!("{} failed", stage)),
    }
}

fn outcome_label(outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Produced => style("produced").green().to_string(),
        StageOutcome::Reused => style("reused").cyan().to_string(),
        StageOutcome::Derived => style("derived").yellow().to_string(),
        StageOutcome::Fallback { .. } => style("fallback").yellow().to_string(),
        StageOutcome::Failed { .. } => style("failed").red().to_string(),
    }
}

/// Render a finished run
pub fn format_report(report: &RunReport, format: &OutputFormat) -> anyhow::Result<String> {
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut lines = vec![format!("{} {}", style("Job").bold(), report.source_id)];
    for record in &report.records {
        let mut line = format!(
            "  {:<14} {:<10} {:>8}",
            record.stage,
            outcome_label(&record.outcome),
            format_duration(record.elapsed.as_secs_f64())
        );
        match &record.outcome {
            StageOutcome::Fallback { error } | StageOutcome::Failed { error } => {
                line.push_str(&format!("  {}", style(error).dim()));
            }
            _ => {
                if let Some(location) = &record.location {
                    line.push_str(&format!("  {}", location.display()));
                }
            }
        }
        lines.push(line);
    }

    let status = if report.is_degraded() {
        style("completed with degraded output").yellow()
    } else {
        style("completed").green()
    };
    lines.push(format!("{} in {}", status, format_duration(report.elapsed.as_secs_f64())));

    Ok(lines.join("\n"))
}

#[derive(Debug, Serialize)]
struct InventoryEntry {
    kind: ArtifactKind,
    file: String,
    present: bool,
}

/// Render which artifacts exist for a job
pub fn format_inventory(job: &Job, inventory: &[(ArtifactKind, bool)], format: &OutputFormat) -> anyhow::Result<String> {
    let entries: Vec<InventoryEntry> = inventory
        .iter()
        .map(|(kind, present)| InventoryEntry {
            kind: *kind,
            file: kind.file_name(job.source_id()),
            present: *present,
        })
        .collect();

    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "source_id": job.source_id(),
            "working_dir": job.working_dir(),
            "artifacts": entries,
        }))?);
    }

    let mut lines = vec![format!(
        "{} {} in {}",
        style("Job").bold(),
        job.source_id(),
        job.working_dir().display()
    )];
    for entry in &entries {
        let mark = if entry.present {
            style("✓").green()
        } else {
            style("·").dim()
        };
        lines.push(format!("  {} {:<20} {}", mark, entry.kind.as_str(), entry.file));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageRecord;

    fn report() -> RunReport {
        RunReport {
            source_id: "abc123".to_string(),
            source_url: "https://video.example/watch?v=abc123".to_string(),
            records: vec![
                StageRecord {
                    stage: "summary".to_string(),
                    kind: ArtifactKind::SummaryText,
                    outcome: StageOutcome::Produced,
                    location: Some("/tmp/abc123_summary.txt".into()),
                    elapsed: Duration::from_secs(3),
                },
                StageRecord {
                    stage: "publication".to_string(),
                    kind: ArtifactKind::PublishedPost,
                    outcome: StageOutcome::Failed {
                        error: "401 Unauthorized".to_string(),
                    },
                    location: None,
                    elapsed: Duration::from_secs(1),
                },
            ],
            elapsed: Duration::from_secs(65),
        }
    }

    #[test]
    fn test_text_report() {
        let text = console::strip_ansi_codes(&format_report(&report(), &OutputFormat::Text).unwrap()).to_string();
        assert!(text.contains("/tmp/abc123_summary.txt"));
        assert!(text.contains("401 Unauthorized"));
        assert!(text.contains("completed with degraded output in 1m 5s"));
    }

    #[test]
    fn test_json_report() {
        let json = format_report(&report(), &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["source_id"], "abc123");
        assert_eq!(value["records"][1]["status"], "failed");
    }

    #[test]
    fn test_inventory() {
        let job = Job::new("https://video.example/watch?v=abc123", "abc123", "/tmp/videos");
        let inventory = vec![(ArtifactKind::RawAudio, true), (ArtifactKind::Transcript, false)];

        let json = format_inventory(&job, &inventory, &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["artifacts"][0]["file"], "abc123.wav");
        assert_eq!(value["artifacts"][0]["present"], true);
        assert_eq!(value["artifacts"][1]["kind"], "transcript");

        let text = console::strip_ansi_codes(&format_inventory(&job, &inventory, &OutputFormat::Text).unwrap()).to_string();
        assert!(text.contains("abc123.txt"));
    }
}
