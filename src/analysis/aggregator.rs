//! Rollup aggregation over a resolved leaf set.
//!
//! Everything here is a pure function of the leaves (or, for team names
//! and velocity, of the feature's own links and hierarchy).

use crate::analysis::resolver::linked_team_milestones;
use crate::graph::WorkGraph;
use crate::models::{Status, StatusTally, WorkItem, WorkItemId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Aggregated status of a leaf set.
pub fn aggregate_status(leaves: &[&WorkItem]) -> Status {
    Status::aggregate(leaves.iter().map(|leaf| leaf.leaf_status()))
}

/// Downgrade `Completed` to `InProgress` unless the sign-off is accepted.
///
/// Without a sign-off field the status passes through. Statuses other
/// than `Completed` are never touched.
pub fn apply_sign_off(status: Status, sign_off: Option<&str>, accepted: &str) -> Status {
    match (status, sign_off) {
        (Status::Completed, Some(value)) if value != accepted => Status::InProgress,
        _ => status,
    }
}

/// True when the set is non-empty and every leaf has status `Completed`.
pub fn all_completed(leaves: &[&WorkItem]) -> bool {
    !leaves.is_empty()
        && leaves
            .iter()
            .all(|leaf| leaf.leaf_status() == Status::Completed)
}

/// Completion flag of a feature, gated by its sign-off.
pub fn is_completed(leaves: &[&WorkItem], sign_off: Option<&str>, accepted: &str) -> bool {
    all_completed(leaves) && sign_off.map_or(true, |value| value == accepted)
}

fn sum_where<W, K>(leaves: &[&WorkItem], weight: W, keep: K) -> u64
where
    W: Fn(&WorkItem) -> u32,
    K: Fn(&WorkItem) -> bool,
{
    leaves
        .iter()
        .copied()
        .filter(|leaf| keep(*leaf))
        .map(|leaf| u64::from(weight(leaf)))
        .sum()
}

fn tally<W>(leaves: &[&WorkItem], weight: W) -> StatusTally
where
    W: Fn(&WorkItem) -> u32,
{
    StatusTally {
        total: sum_where(leaves, &weight, |_| true),
        completed: sum_where(leaves, &weight, |leaf| leaf.leaf_completed()),
        not_completed: sum_where(leaves, &weight, |leaf| !leaf.leaf_completed()),
        in_progress: sum_where(leaves, &weight, |leaf| {
            leaf.leaf_status() == Status::InProgress
        }),
        not_done: sum_where(leaves, &weight, |leaf| leaf.leaf_status() == Status::NotDone),
        blocked: sum_where(leaves, &weight, |leaf| leaf.leaf_status() == Status::Blocked),
    }
}

/// Point sums per status category.
pub fn points_breakdown(leaves: &[&WorkItem]) -> StatusTally {
    tally(leaves, |leaf| leaf.points)
}

/// Item counts per status category.
pub fn item_counts(leaves: &[&WorkItem]) -> StatusTally {
    tally(leaves, |_| 1)
}

/// Sorted, distinct team names of the milestones linked to `feature`.
pub fn team_names(graph: &WorkGraph, feature: WorkItemId) -> Vec<String> {
    linked_team_milestones(graph, feature)
        .into_iter()
        .filter_map(|milestone| milestone.team_name())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Team names joined with `;`.
pub fn team_string(graph: &WorkGraph, feature: WorkItemId) -> String {
    team_names(graph, feature).join(";")
}

/// Points of completed descendant leaves whose status changed within the
/// trailing window ending at `now`.
///
/// Walks the owned hierarchy only; links are not followed. Leaves without
/// a "Status last changed" value never count.
pub fn velocity(
    graph: &WorkGraph,
    feature: WorkItemId,
    now: DateTime<Utc>,
    window: Duration,
) -> u64 {
    let cutoff = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    graph
        .descendant_leaves(feature)
        .into_iter()
        .filter(|leaf| leaf.leaf_completed())
        .filter(|leaf| {
            leaf.fields
                .status_last_changed
                .is_some_and(|changed| changed > cutoff)
        })
        .map(|leaf| u64::from(leaf.points))
        .sum()
}

/// Rollup of the leaves that belong to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub project: String,
    /// Project name without the team prefix.
    pub team: String,
    pub status: Status,
    pub points_completed: u64,
    pub points_total: u64,
    pub items_completed: u64,
    pub items_total: u64,
    /// Distinct planned sprints of unfinished leaves, sorted.
    pub planned_sprints: Vec<String>,
}

impl ProjectSummary {
    pub fn planned_sprints_text(&self) -> String {
        self.planned_sprints.join(", ")
    }

    /// Latest planned sprint of the project, if any.
    pub fn latest_sprint(&self) -> Option<&str> {
        self.planned_sprints.last().map(String::as_str)
    }
}

/// Summaries per project, in order of first appearance among the leaves.
///
/// Only planned-sprint values starting with `sprint_marker` are kept.
pub fn project_summaries(leaves: &[&WorkItem], sprint_marker: &str) -> Vec<ProjectSummary> {
    let mut projects: Vec<&str> = Vec::new();
    for leaf in leaves {
        if !projects.contains(&leaf.project.as_str()) {
            projects.push(&leaf.project);
        }
    }

    projects
        .into_iter()
        .map(|project| {
            let tasks: Vec<&WorkItem> = leaves
                .iter()
                .copied()
                .filter(|leaf| leaf.project == project)
                .collect();
            let points = points_breakdown(&tasks);
            let items = item_counts(&tasks);

            let planned_sprints: BTreeSet<String> = tasks
                .iter()
                .filter(|leaf| !leaf.leaf_completed())
                .filter_map(|leaf| leaf.fields.planned_sprint.as_deref())
                .filter(|sprint| !sprint.is_empty() && sprint.starts_with(sprint_marker))
                .map(String::from)
                .collect();

            ProjectSummary {
                project: project.to_string(),
                team: tasks
                    .first()
                    .and_then(|leaf| leaf.team_name())
                    .unwrap_or(project)
                    .to_string(),
                status: aggregate_status(&tasks),
                points_completed: points.completed,
                points_total: points.total,
                items_completed: items.completed,
                items_total: items.total,
                planned_sprints: planned_sprints.into_iter().collect(),
            }
        })
        .collect()
}

/// Latest planned sprint across all projects.
pub fn latest_planned_sprint(summaries: &[ProjectSummary]) -> Option<String> {
    summaries
        .iter()
        .filter_map(ProjectSummary::latest_sprint)
        .max()
        .map(String::from)
}
