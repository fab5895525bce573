//! Stage graph orchestration.
//!
//! A [`Pipeline`] owns the stages of one job. Stages launch as soon as every
//! artifact they read (or wait for) is available, up to a concurrency limit,
//! and the failure policy of each stage decides whether the job stops, carries
//! on with fallback text or just records the problem.

use futures_util::stream::{FuturesUnordered, StreamExt};
use indicatif::{MultiProgress, ProgressBar};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod executor;
pub mod plan;

pub use executor::StageExecutor;

use crate::job::Job;
use crate::stages::{FailurePolicy, Stage};
use crate::store::{Artifact, ArtifactKind, ArtifactOrigin, ArtifactStore};
use crate::{PipelineResult, PublisherError};

/// Requests a running pipeline to stop before its next stage
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a stage ended in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Produced,
    Reused,
    /// Built from fallback input; kept in memory for this run only
    Derived,
    /// Failed and replaced by fallback text
    Fallback { error: String },
    /// Failed; the job went on without its output
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub kind: ArtifactKind,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<std::path::PathBuf>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Summary of a finished run, in completion order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source_id: String,
    pub source_url: String,
    pub records: Vec<StageRecord>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether any stage fell back, worked from fallback input or failed
    /// without stopping the job
    pub fn is_degraded(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(
                r.outcome,
                StageOutcome::Derived | StageOutcome::Fallback { .. } | StageOutcome::Failed { .. }
            )
        })
    }

    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.records.iter().find(|r| r.stage == stage).map(|r| &r.outcome)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// The stage graph for one job
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    executor: StageExecutor,
    cancel: CancelHandle,
    max_concurrent: usize,
    progress: Option<MultiProgress>,
}

impl Pipeline {
    pub fn new(store: ArtifactStore, max_concurrent: usize) -> Self {
        Self {
            stages: Vec::new(),
            executor: StageExecutor::new(store),
            cancel: CancelHandle::default(),
            max_concurrent: max_concurrent.max(1),
            progress: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Show a spinner per running stage
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Check the graph: unique outputs, every dependency produced by some
    /// stage, nothing waiting on a stage whose failure is only reported, and
    /// no cycles.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut producers: HashMap<ArtifactKind, &dyn Stage> = HashMap::new();
        for stage in &self.stages {
            if let Some(other) = producers.insert(stage.output(), stage.as_ref()) {
                return Err(PublisherError::Graph(format!(
                    "{} is produced by both '{}' and '{}'",
                    stage.output(),
                    other.name(),
                    stage.name()
                )));
            }
        }

        for stage in &self.stages {
            for kind in dependencies(stage.as_ref()) {
                match producers.get(&kind) {
                    None => {
                        return Err(PublisherError::Graph(format!(
                            "'{}' needs {} but no stage produces it",
                            stage.name(),
                            kind
                        )))
                    }
                    Some(producer) if producer.policy() == FailurePolicy::Report => {
                        return Err(PublisherError::Graph(format!(
                            "'{}' depends on '{}', whose failures are only reported",
                            stage.name(),
                            producer.name()
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        let mut reachable: HashSet<ArtifactKind> = HashSet::new();
        let mut remaining: Vec<&dyn Stage> = self.stages.iter().map(|s| s.as_ref()).collect();
        loop {
            let before = remaining.len();
            remaining.retain(|stage| {
                let ready = dependencies(*stage).iter().all(|kind| reachable.contains(kind));
                if ready {
                    reachable.insert(stage.output());
                }
                !ready
            });
            if remaining.is_empty() {
                return Ok(());
            }
            if remaining.len() == before {
                let names: Vec<&str> = remaining.iter().map(|s| s.name()).collect();
                return Err(PublisherError::Graph(format!("dependency cycle among {}", names.join(", "))));
            }
        }
    }

    /// Run every stage for `job`.
    ///
    /// Returns an error for a fatal stage failure, a store failure or a
    /// cancellation; absorbed and reported failures end up in the report.
    pub async fn run(&self, job: &Job) -> PipelineResult<RunReport> {
        self.validate()?;

        let started = Instant::now();
        let mut pending: Vec<Arc<dyn Stage>> = self.stages.clone();
        let mut available: HashSet<ArtifactKind> = HashSet::new();
        let mut fallbacks: HashMap<ArtifactKind, Artifact> = HashMap::new();
        let mut records = Vec::new();
        let mut in_flight = FuturesUnordered::new();

        tracing::info!("Starting {} stages for {}", pending.len(), job.source_id());

        loop {
            while in_flight.len() < self.max_concurrent {
                let Some(index) = pending
                    .iter()
                    .position(|stage| dependencies(stage.as_ref()).iter().all(|kind| available.contains(kind)))
                else {
                    break;
                };

                let stage = pending.remove(index);
                if self.cancel.is_cancelled() {
                    tracing::warn!("Cancelled before {}", stage.name());
                    return Err(PublisherError::Cancelled {
                        job: job.source_id().to_string(),
                        stage: stage.name().to_string(),
                    });
                }

                // Each stage sees the fallbacks known at launch time
                let snapshot = fallbacks.clone();
                let executor = self.executor.clone();
                let job = job.clone();
                let spinner = self.spinner(stage.as_ref());
                in_flight.push(async move {
                    let launched = Instant::now();
                    let result = executor.run(stage.as_ref(), &job, &snapshot).await;
                    (stage, result, launched.elapsed(), spinner)
                });
            }

            let Some((stage, result, elapsed, spinner)) = in_flight.next().await else {
                break;
            };

            let record = self.settle(stage.as_ref(), job, result, elapsed, spinner.as_ref(), &mut fallbacks)?;
            if !matches!(record.outcome, StageOutcome::Failed { .. }) {
                available.insert(record.kind);
            }
            records.push(record);
        }

        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|s| s.name()).collect();
            return Err(PublisherError::Graph(format!("stages never became ready: {}", names.join(", "))));
        }

        let report = RunReport {
            source_id: job.source_id().to_string(),
            source_url: job.source_url().to_string(),
            records,
            elapsed: started.elapsed(),
        };

        if report.is_degraded() {
            tracing::warn!("Finished {} with degraded output", job.source_id());
        } else {
            tracing::info!("Finished {}", job.source_id());
        }

        Ok(report)
    }

    /// Apply the stage's failure policy to one result
    fn settle(
        &self,
        stage: &dyn Stage,
        job: &Job,
        result: PipelineResult<Artifact>,
        elapsed: Duration,
        spinner: Option<&ProgressBar>,
        fallbacks: &mut HashMap<ArtifactKind, Artifact>,
    ) -> PipelineResult<StageRecord> {
        let kind = stage.output();

        let error = match result {
            Ok(artifact) => {
                let outcome = match artifact.origin {
                    ArtifactOrigin::Reused => StageOutcome::Reused,
                    ArtifactOrigin::Derived | ArtifactOrigin::Fallback => StageOutcome::Derived,
                    ArtifactOrigin::Produced => StageOutcome::Produced,
                };
                if let Some(spinner) = spinner {
                    crate::output::finish_spinner(spinner, stage.name(), &outcome);
                }
                let location = if artifact.is_transient() {
                    fallbacks.insert(kind, artifact);
                    None
                } else {
                    Some(artifact.location)
                };
                return Ok(StageRecord {
                    stage: stage.name().to_string(),
                    kind,
                    outcome,
                    location,
                    elapsed,
                });
            }
            Err(error) => error,
        };

        // Only collaborator failures are subject to the stage policy
        let policy = match error {
            PublisherError::Stage { .. } => stage.policy(),
            _ => FailurePolicy::Fatal,
        };

        let outcome = match policy {
            FailurePolicy::Fatal => {
                tracing::error!("{}", error);
                if let Some(spinner) = spinner {
                    spinner.abandon_with_message(format!("{} failed", stage.name()));
                }
                return Err(error);
            }
            FailurePolicy::Fallback(text) => {
                tracing::warn!("{}; using fallback text", error);
                fallbacks.insert(
                    kind,
                    Artifact {
                        kind,
                        location: self.executor.store().location(job, kind),
                        produced_by: stage.name().to_string(),
                        origin: ArtifactOrigin::Fallback,
                        fallback: Some(text),
                    },
                );
                StageOutcome::Fallback {
                    error: error.to_string(),
                }
            }
            FailurePolicy::Report => {
                tracing::error!("{}", error);
                StageOutcome::Failed {
                    error: error.to_string(),
                }
            }
        };

        if let Some(spinner) = spinner {
            crate::output::finish_spinner(spinner, stage.name(), &outcome);
        }

        Ok(StageRecord {
            stage: stage.name().to_string(),
            kind,
            outcome,
            location: None,
            elapsed,
        })
    }

    fn spinner(&self, stage: &dyn Stage) -> Option<ProgressBar> {
        self.progress
            .as_ref()
            .map(|multi| crate::output::stage_spinner(multi, stage.name()))
    }
}

/// Artifacts a stage reads or waits for
fn dependencies(stage: &dyn Stage) -> Vec<ArtifactKind> {
    let mut kinds = stage.inputs();
    kinds.extend(stage.after());
    kinds
}
