//! Batch recomputation of a whole snapshot.
//!
//! Every job is computed against the same read-only graph, with bounded
//! parallelism. Results are then sorted by job (features, tasks, epics,
//! each by item id) and written back one at a time, so the outcome does
//! not depend on scheduling order.

use crate::analysis::propagator::{propagate, Propagation, ScheduleUpdate};
use crate::analysis::rollup::{rollup_feature, FeatureRollup, RollupSettings};
use crate::analysis::team_string;
use crate::config::{Config, TeamDirectory};
use crate::error::RollupError;
use crate::graph::WorkGraph;
use crate::models::{ItemKind, WorkItemId};
use crate::report::summary::{epic_summary, feature_summary, SummarySettings};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Job {
    Feature(WorkItemId),
    Task(WorkItemId),
    Epic(WorkItemId),
}

impl Job {
    pub fn id(&self) -> WorkItemId {
        match self {
            Job::Feature(id) | Job::Task(id) | Job::Epic(id) => *id,
        }
    }
}

/// Options of a batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Label of the snapshot, shown in the report.
    pub source: String,
    pub rollup: RollupSettings,
    pub summary: SummarySettings,
    pub default_product_owner: String,
    pub concurrency: usize,
    /// Explicit features; replaces automatic selection when non-empty.
    pub features: Vec<WorkItemId>,
    /// Explicit scheduled tasks; replaces automatic selection when non-empty.
    pub tasks: Vec<WorkItemId>,
    pub program: Option<String>,
    pub now: DateTime<Utc>,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config, source: &str, now: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            rollup: RollupSettings::from(&config.rollup),
            summary: SummarySettings::from(config.report.clone()),
            default_product_owner: config.report.default_product_owner.clone(),
            concurrency: config.general.concurrency.max(1),
            features: Vec::new(),
            tasks: Vec::new(),
            program: None,
            now,
            show_progress: false,
        }
    }
}

/// Pick the jobs of a run.
///
/// Without explicit ids, every item outside team projects is considered:
/// backlog items and milestones are rolled up, scheduled tasks receive
/// propagation and epics get a feature summary. With `program` set,
/// features none of whose teams belong to the program are skipped.
pub fn select_targets(
    graph: &WorkGraph,
    options: &RunOptions,
    directory: &TeamDirectory,
) -> Vec<Job> {
    let mut jobs: Vec<Job> = if options.features.is_empty() && options.tasks.is_empty() {
        graph
            .items()
            .filter(|item| !item.is_in_team_project())
            .filter_map(|item| match item.kind {
                ItemKind::BacklogItem | ItemKind::Milestone => Some(Job::Feature(item.id)),
                ItemKind::ScheduledTask => Some(Job::Task(item.id)),
                ItemKind::Epic => Some(Job::Epic(item.id)),
                ItemKind::CommittedBacklogItem => None,
            })
            .collect()
    } else {
        options
            .features
            .iter()
            .map(|id| Job::Feature(*id))
            .chain(options.tasks.iter().map(|id| Job::Task(*id)))
            .collect()
    };

    if let Some(ref program) = options.program {
        jobs.retain(|job| match job {
            Job::Feature(id) => {
                directory.any_team_in_program(&team_string(graph, *id), program)
            }
            _ => true,
        });
    }

    jobs.sort_by_key(Job::id);
    jobs.dedup();
    jobs
}

/// Result of one job, before it is written back.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Feature {
        rollup: FeatureRollup,
        summary: String,
    },
    Task {
        task: WorkItemId,
        propagation: Propagation,
    },
    Epic {
        epic: WorkItemId,
        summary: String,
    },
}

struct JobContext {
    rollup: RollupSettings,
    summary: SummarySettings,
    default_product_owner: String,
    directory: TeamDirectory,
    now: DateTime<Utc>,
}

fn compute_job(graph: &WorkGraph, job: Job, ctx: &JobContext) -> Result<Outcome, RollupError> {
    match job {
        Job::Feature(id) => {
            let rollup = rollup_feature(graph, id, &ctx.rollup, ctx.now)?;
            let summary = feature_summary(&rollup, &ctx.directory, &ctx.default_product_owner);
            Ok(Outcome::Feature { rollup, summary })
        }
        Job::Task(id) => Ok(Outcome::Task {
            task: id,
            propagation: propagate(graph, id)?,
        }),
        Job::Epic(id) => {
            graph.get(id).ok_or(RollupError::UnknownItem(id))?;
            Ok(Outcome::Epic {
                epic: id,
                summary: epic_summary(graph, id, &ctx.summary),
            })
        }
    }
}

/// A feature row of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureEntry {
    #[serde(flatten)]
    pub rollup: FeatureRollup,
    pub summary: String,
}

/// A propagated scheduled task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEntry {
    pub name: String,
    #[serde(flatten)]
    pub update: ScheduleUpdate,
}

/// An item the run looked at without changing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRef {
    pub id: WorkItemId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// An epic with its feature summary.
#[derive(Debug, Clone, Serialize)]
pub struct EpicEntry {
    pub id: WorkItemId,
    pub name: String,
    pub summary: String,
}

/// Run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub source: String,
    pub evaluated_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub items: usize,
    pub jobs: usize,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub features: Vec<FeatureEntry>,
    pub tasks: Vec<TaskEntry>,
    /// Scheduled tasks with conflicting upstream links, now `Blocked`.
    pub blocked: Vec<ItemRef>,
    pub epics: Vec<EpicEntry>,
    /// Unlinked features and tasks without upstream input.
    pub unchanged: Vec<ItemRef>,
}

impl RunReport {
    fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            features: Vec::new(),
            tasks: Vec::new(),
            blocked: Vec::new(),
            epics: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

fn progress_bar(len: usize, show: bool) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    Some(pb)
}

/// Recompute every selected item of `graph`.
///
/// Returns the updated graph and the run report. A root that can never be
/// a feature aborts the run before anything is written.
pub async fn recompute(
    graph: WorkGraph,
    options: &RunOptions,
    directory: TeamDirectory,
) -> Result<(WorkGraph, RunReport)> {
    let started = Instant::now();
    let jobs = select_targets(&graph, options, &directory);
    info!("Recomputing {} items of {}", jobs.len(), options.source);

    let shared = Arc::new(graph);
    let ctx = Arc::new(JobContext {
        rollup: options.rollup.clone(),
        summary: options.summary.clone(),
        default_product_owner: options.default_product_owner.clone(),
        directory,
        now: options.now,
    });
    let pb = progress_bar(jobs.len(), options.show_progress);
    let job_count = jobs.len();

    let results: Vec<_> = stream::iter(jobs)
        .map(|job| {
            let graph = Arc::clone(&shared);
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || (job, compute_job(&graph, job, &ctx)))
        })
        .buffer_unordered(options.concurrency.max(1))
        .inspect(|_| {
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        })
        .collect()
        .await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let mut finished = Vec::with_capacity(results.len());
    for result in results {
        finished.push(result.context("Recompute worker panicked")?);
    }
    finished.sort_by_key(|(job, _)| *job);

    let mut outcomes = Vec::with_capacity(finished.len());
    for (job, result) in finished {
        outcomes.push(result.with_context(|| format!("Failed to recompute {}", job.id()))?);
    }

    let mut graph = Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone());
    let metadata = RunMetadata {
        source: options.source.clone(),
        evaluated_at: options.now,
        generated_at: Utc::now(),
        duration_seconds: 0.0,
        items: graph.len(),
        jobs: job_count,
    };
    let mut report = RunReport::new(metadata);

    for outcome in outcomes {
        apply_outcome(&mut graph, outcome, &mut report)?;
    }

    report.metadata.duration_seconds = started.elapsed().as_secs_f64();
    info!(
        "Updated {} features, {} tasks and {} epics; {} unchanged",
        report.features.len(),
        report.tasks.len() + report.blocked.len(),
        report.epics.len(),
        report.unchanged.len()
    );

    Ok((graph, report))
}

fn item_name(graph: &WorkGraph, id: WorkItemId) -> String {
    graph.get(id).map(|item| item.name.clone()).unwrap_or_default()
}

fn apply_outcome(graph: &mut WorkGraph, outcome: Outcome, report: &mut RunReport) -> Result<()> {
    match outcome {
        Outcome::Feature { rollup, summary } => {
            rollup.apply(graph, &summary)?;
            if !rollup.is_linked() {
                report.unchanged.push(ItemRef {
                    id: rollup.feature,
                    name: rollup.name.clone(),
                    reason: Some("unlinked".to_string()),
                });
            }
            report.features.push(FeatureEntry { rollup, summary });
        }
        Outcome::Task { task, propagation } => {
            propagation.apply(graph, task)?;
            let name = item_name(graph, task);
            match propagation {
                Propagation::Updated(update) => report.tasks.push(TaskEntry { name, update }),
                Propagation::Ambiguous => report.blocked.push(ItemRef {
                    id: task,
                    name,
                    reason: Some("conflicting upstream links".to_string()),
                }),
                Propagation::NoInput => report.unchanged.push(ItemRef {
                    id: task,
                    name,
                    reason: Some("no upstream link".to_string()),
                }),
            }
        }
        Outcome::Epic { epic, summary } => {
            let item = graph.get_mut(epic).ok_or(RollupError::UnknownItem(epic))?;
            item.derived.summary = Some(summary.clone());
            debug!("Wrote summary of epic {}", epic);
            report.epics.push(EpicEntry {
                id: epic,
                name: item.name.clone(),
                summary,
            });
        }
    }
    Ok(())
}
