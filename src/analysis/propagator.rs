//! Schedule propagation from a single upstream link.
//!
//! A scheduled task mirrors exactly one of: a milestone, another scheduled
//! task, or a group of backlog stories, all in team projects. Mixing a
//! milestone or scheduled-task link with anything else is a defect and
//! shows up as a `Blocked` status.

use crate::error::RollupError;
use crate::graph::WorkGraph;
use crate::models::{ItemKind, Status, TrackingMode, WorkField, WorkItem, WorkItemId};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

/// Where a propagated update came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum LinkSource {
    Milestone(WorkItemId),
    ScheduledTask(WorkItemId),
    Stories(Vec<WorkItemId>),
}

/// Work totals to write; a `None` inside clears the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkTotals {
    pub remaining: Option<i64>,
    pub completed: Option<i64>,
}

/// Fields propagated onto a scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleUpdate {
    pub task: WorkItemId,
    pub source: LinkSource,
    pub status: Status,
    /// Set when the propagated status is `Completed`; never clears the flag.
    pub completed: bool,
    pub percent_complete: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work: Option<WorkTotals>,
}

/// Outcome of propagating onto one task.
#[derive(Debug, Clone, PartialEq)]
pub enum Propagation {
    Updated(ScheduleUpdate),
    /// More than one mutually exclusive link; only the status becomes
    /// `Blocked`.
    Ambiguous,
    /// Nothing to propagate; the task is left untouched.
    NoInput,
}

impl Propagation {
    /// Write the outcome onto `task`.
    pub fn apply(&self, graph: &mut WorkGraph, task: WorkItemId) -> Result<(), RollupError> {
        let item = graph
            .get_mut(task)
            .ok_or(RollupError::UnknownItem(task))?;

        match self {
            Propagation::NoInput => {}
            Propagation::Ambiguous => {
                item.status = Status::Blocked;
                item.derived.status_text = Some(Status::Blocked.to_string());
            }
            Propagation::Updated(update) => {
                item.status = update.status;
                item.derived.status_text = Some(update.status.to_string());
                if update.completed {
                    item.completed = true;
                }
                item.percent_complete = update.percent_complete;
                if let Some(finish) = update.finish {
                    item.finish = Some(finish);
                }
                if let Some(time_zone) = &update.time_zone {
                    item.time_zone = Some(time_zone.clone());
                }
                if let Some(work) = update.work {
                    item.fields.set_work(WorkField::RemainingWork, work.remaining);
                    item.fields.set_work(WorkField::CompletedWork, work.completed);
                }
            }
        }

        Ok(())
    }
}

fn percent(total: f64, not_done: f64) -> u8 {
    if total == 0.0 {
        return 0;
    }
    (100.0 * (total - not_done) / total).clamp(0.0, 100.0) as u8
}

fn percent_points(total: u64, not_done: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = u128::from(total.saturating_sub(not_done));
    (100 * done / u128::from(total)) as u8
}

fn linked_of<'g, F>(graph: &'g WorkGraph, task: WorkItemId, keep: F) -> Vec<&'g WorkItem>
where
    F: Fn(&WorkItem) -> bool,
{
    graph
        .linked(task)
        .filter(|item| item.is_in_team_project() && keep(*item))
        .collect()
}

/// Work out what `task` should mirror from its upstream link.
pub fn propagate(graph: &WorkGraph, task: WorkItemId) -> Result<Propagation, RollupError> {
    let target = graph.get(task).ok_or(RollupError::UnknownItem(task))?;
    if target.kind != ItemKind::ScheduledTask {
        return Ok(Propagation::NoInput);
    }

    let milestones = linked_of(graph, task, |item| item.kind == ItemKind::Milestone);
    let scheduled = linked_of(graph, task, |item| item.kind == ItemKind::ScheduledTask);
    let stories = linked_of(graph, task, |item| item.kind.is_uncommitted_backlog_item());

    let total = milestones.len() + scheduled.len() + stories.len();
    if total == 0 {
        debug!("{} has no upstream link", task);
        return Ok(Propagation::NoInput);
    }
    if (!milestones.is_empty() || !scheduled.is_empty()) && total > 1 {
        debug!(
            "{} has {} milestone, {} scheduled and {} story links",
            task,
            milestones.len(),
            scheduled.len(),
            stories.len()
        );
        return Ok(Propagation::Ambiguous);
    }

    let update = if let Some(milestone) = milestones.first() {
        from_milestone(graph, target, milestone)
    } else if let Some(source) = scheduled.first() {
        from_scheduled_task(graph, target, source)
    } else {
        from_stories(graph, target, &stories)
    };

    Ok(Propagation::Updated(update))
}

fn from_milestone(graph: &WorkGraph, target: &WorkItem, milestone: &WorkItem) -> ScheduleUpdate {
    let finish = milestone.date.map(|date| match target.start {
        Some(start) if date < start => start,
        _ => date,
    });

    let summary = graph.milestone_summary(milestone.id);
    let tasks = summary
        .as_ref()
        .map(|s| s.dependent_tasks.as_slice())
        .unwrap_or_default();

    let status = Status::aggregate(tasks.iter().filter_map(|t| graph.aggregated_status(*t)));

    let percent_complete = match &summary {
        Some(s) if s.tracking == TrackingMode::Points => percent_points(s.points, s.points_not_done),
        Some(s) => percent(s.duration_days, s.duration_days_not_done),
        None => 0,
    };

    let sum_work = |field: WorkField| -> i64 {
        tasks
            .iter()
            .map(|t| graph.aggregated_work(*t, field).unwrap_or(0))
            .sum()
    };

    ScheduleUpdate {
        task: target.id,
        source: LinkSource::Milestone(milestone.id),
        status,
        completed: status == Status::Completed,
        percent_complete,
        finish,
        time_zone: None,
        work: Some(WorkTotals {
            remaining: Some(sum_work(WorkField::RemainingWork)),
            completed: Some(sum_work(WorkField::CompletedWork)),
        }),
    }
}

fn from_scheduled_task(graph: &WorkGraph, target: &WorkItem, source: &WorkItem) -> ScheduleUpdate {
    let status = graph.aggregated_status(source.id).unwrap_or_default();

    ScheduleUpdate {
        task: target.id,
        source: LinkSource::ScheduledTask(source.id),
        status,
        completed: status == Status::Completed,
        percent_complete: percent(
            graph.aggregated_duration(source.id),
            graph.aggregated_duration_not_done(source.id),
        ),
        finish: None,
        time_zone: source.time_zone.clone(),
        work: Some(WorkTotals {
            remaining: graph.aggregated_work(source.id, WorkField::RemainingWork),
            completed: graph.aggregated_work(source.id, WorkField::CompletedWork),
        }),
    }
}

fn from_stories(graph: &WorkGraph, target: &WorkItem, stories: &[&WorkItem]) -> ScheduleUpdate {
    let status = Status::aggregate(
        stories
            .iter()
            .filter_map(|story| graph.aggregated_status(story.id)),
    );
    let points: u64 = stories.iter().map(|s| graph.aggregated_points(s.id)).sum();
    let not_done: u64 = stories
        .iter()
        .map(|s| graph.aggregated_points_not_done(s.id))
        .sum();

    ScheduleUpdate {
        task: target.id,
        source: LinkSource::Stories(stories.iter().map(|s| s.id).collect()),
        status,
        completed: status == Status::Completed,
        percent_complete: percent_points(points, not_done),
        finish: None,
        time_zone: None,
        work: None,
    }
}
