//! Fixed-width text summaries written onto features and epics.
//!
//! The host renders these with its own markup, so lines are wrapped in
//! `<CODE>` and section titles in `<BOLD>`. Column widths count
//! characters, not bytes.

use crate::analysis::rollup::FeatureRollup;
use crate::config::{ReportConfig, TeamDirectory};
use crate::graph::WorkGraph;
use crate::models::{WorkItem, WorkItemId};

const ELLIPSIS: char = '…';

const TEAM_WIDTH: usize = 14;
const NAME_WIDTH: usize = 20;
const MILESTONE_WIDTH: usize = 28;

const FEATURE_SEPARATOR: &str =
    "<CODE>────────────────┼─────────────┼─────────┼──────────┼─────────────────┼───────────────────</CODE>\n";
const DEVELOPMENT_SEPARATOR: &str =
    "<CODE>─────────────────────┼───────────────┼──────────┼─────────────────────────────</CODE>\n";
const BACKLOG_SEPARATOR: &str =
    "<CODE>─────────────────────┼────────┼─────────────────────────────</CODE>\n";

/// Settings of the epic summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySettings {
    /// Estimate in points (true) or estimated days (false).
    pub use_points: bool,
    /// Custom field read for the "done" part of the progress column.
    pub completed_field: String,
}

impl Default for SummarySettings {
    fn default() -> Self {
        ReportConfig::default().into()
    }
}

impl From<ReportConfig> for SummarySettings {
    fn from(config: ReportConfig) -> Self {
        Self {
            use_points: config.use_points,
            completed_field: config.completed_field,
        }
    }
}

/// Cut `text` to at most `max` characters, marking the cut with `…`.
pub fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push(ELLIPSIS);
    short
}

fn feature_line(cells: [&str; 6]) -> String {
    format!(
        "<CODE>{:<15} │ {:<11} │ {:<7} │ {:<8} │ {:<15} │ {:<15}</CODE>\n",
        cells[0], cells[1], cells[2], cells[3], cells[4], cells[5]
    )
}

/// Per-team table of a feature rollup.
///
/// Empty for an unlinked feature.
pub fn feature_summary(
    rollup: &FeatureRollup,
    directory: &TeamDirectory,
    default_owner: &str,
) -> String {
    if !rollup.is_linked() {
        return String::new();
    }

    let mut out = feature_line([
        "Team",
        "Status",
        "Points",
        "Stories",
        "Product Owner",
        "Planned sprint",
    ]);
    out.push_str(FEATURE_SEPARATOR);

    for project in &rollup.projects {
        let owner = directory
            .product_owner(&project.team)
            .unwrap_or(default_owner);

        out.push_str(&feature_line([
            &shorten(&project.team, TEAM_WIDTH),
            &project.status.to_string(),
            &format!("{}/{}", project.points_completed, project.points_total),
            &format!("{}/{}", project.items_completed, project.items_total),
            &shorten(owner, TEAM_WIDTH),
            &project.planned_sprints_text(),
        ]));
    }

    out
}

/// Milestones an item is tagged to, fitted into one column.
pub fn milestone_string(graph: &WorkGraph, id: WorkItemId) -> String {
    let names = graph.milestone_names(id);
    let mut text = names.join(", ");
    if names.len() > 1 && text.chars().count() > MILESTONE_WIDTH {
        text = format!("{} milestones", names.len());
    }
    shorten(&text, MILESTONE_WIDTH)
}

fn estimate(graph: &WorkGraph, item: &WorkItem, settings: &SummarySettings) -> f64 {
    if settings.use_points {
        graph.aggregated_points(item.id) as f64
    } else {
        graph.aggregated_estimated_days(item.id)
    }
}

/// Development and backlog tables for an epic.
///
/// Only linked items of other projects are listed. An item counts as in
/// development when its project schedules an item of the same name.
pub fn epic_summary(graph: &WorkGraph, epic: WorkItemId, settings: &SummarySettings) -> String {
    let Some(root) = graph.get(epic) else {
        return String::new();
    };

    let (development, backlog): (Vec<&WorkItem>, Vec<&WorkItem>) = graph
        .linked(epic)
        .filter(|item| item.project != root.project)
        .partition(|item| graph.is_scheduled_in_project(item.id));

    let mut out = format!("<BOLD>Development ({})</BOLD>\n", development.len());
    if !development.is_empty() {
        out.push_str(&format!(
            "<CODE>{:<20} │ {:<13} │ {:>8} │ {}</CODE>\n",
            "Name", "Status", "Done", "Milestone(s)"
        ));
        out.push_str(DEVELOPMENT_SEPARATOR);

        for item in &development {
            let done = item
                .fields
                .display_value(&settings.completed_field)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "0".to_string());
            let status = graph.aggregated_status(item.id).unwrap_or_default();

            out.push_str(&format!(
                "<CODE>{:<20} │ {:<13} │ {:>8} │ {}</CODE>\n",
                shorten(&item.name, NAME_WIDTH),
                status.to_string(),
                format!("{}/{}", done, estimate(graph, item, settings)),
                milestone_string(graph, item.id)
            ));
        }
    }
    out.push('\n');

    out.push_str(&format!("<BOLD>Feature backlog ({})</BOLD>\n", backlog.len()));
    if !backlog.is_empty() {
        out.push_str(&format!(
            "<CODE>{:<20} │ {:>6} │ {}</CODE>\n",
            "Name", "Est.", "Milestone(s)"
        ));
        out.push_str(BACKLOG_SEPARATOR);

        for item in &backlog {
            out.push_str(&format!(
                "<CODE>{:<20} │ {:>6} │ {}</CODE>\n",
                shorten(&item.name, NAME_WIDTH),
                estimate(graph, item, settings).to_string(),
                milestone_string(graph, item.id)
            ));
        }
    }

    out
}
