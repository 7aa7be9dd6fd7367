//! Feature rollup: resolve once, aggregate everything, write back.
//!
//! An unlinked feature is an expected state. It produces a record whose
//! numeric fields are `None` (rendered blank), whose completion flag is
//! false and whose planned sprint is cleared. Only an ineligible root is
//! reported as an error.

use crate::analysis::aggregator::{
    aggregate_status, apply_sign_off, is_completed, item_counts, latest_planned_sprint,
    points_breakdown, project_summaries, team_string, velocity, ProjectSummary,
};
use crate::analysis::resolver::{resolve, Resolution, ResolveOptions};
use crate::error::RollupError;
use crate::graph::WorkGraph;
use crate::models::{Status, StatusTally, WorkItemId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

/// Accepted value of the "Sign off" field.
pub const DEFAULT_ACCEPTED_SIGN_OFF: &str = "Accepted by PM/SA";

/// Tunables of a feature rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupSettings {
    pub resolve: ResolveOptions,
    pub accepted_sign_off: String,
    /// Prefix of planned-sprint values that belong to the sprint series.
    pub sprint_marker: String,
    pub velocity_window: Duration,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            resolve: ResolveOptions::default(),
            accepted_sign_off: DEFAULT_ACCEPTED_SIGN_OFF.to_string(),
            sprint_marker: "S".to_string(),
            velocity_window: Duration::days(14),
        }
    }
}

impl From<&crate::config::RollupConfig> for RollupSettings {
    fn from(config: &crate::config::RollupConfig) -> Self {
        Self {
            resolve: ResolveOptions {
                follow_child_links: config.follow_child_links,
                follow_milestone_links: config.follow_milestone_links,
            },
            accepted_sign_off: config.accepted_sign_off.clone(),
            sprint_marker: config.sprint_marker.clone(),
            velocity_window: Duration::try_days(config.velocity_window_days)
                .unwrap_or(Duration::MAX),
        }
    }
}

/// Everything derived for one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRollup {
    pub feature: WorkItemId,
    pub name: String,
    /// `None` while the feature is unlinked; the status is left alone.
    pub status: Option<Status>,
    pub completed: bool,
    pub points: Option<StatusTally>,
    pub items: Option<StatusTally>,
    pub team: String,
    pub velocity: u64,
    pub projects: Vec<ProjectSummary>,
    /// New value of the feature's planned sprint; `None` clears it.
    pub planned_sprint: Option<String>,
}

impl FeatureRollup {
    pub fn is_linked(&self) -> bool {
        self.status.is_some()
    }

    /// Write the derived values onto the feature.
    ///
    /// `summary` is the formatted report text for the feature.
    pub fn apply(&self, graph: &mut WorkGraph, summary: &str) -> Result<(), RollupError> {
        let item = graph
            .get_mut(self.feature)
            .ok_or(RollupError::UnknownItem(self.feature))?;

        if let Some(status) = self.status {
            item.status = status;
            item.derived.status_text = Some(status.to_string());
        }
        item.completed = self.completed;
        item.derived.points = self.points;
        item.derived.items = self.items;
        item.derived.team = Some(self.team.clone());
        item.derived.velocity = Some(self.velocity);
        item.derived.summary = Some(summary.to_string());
        item.fields.planned_sprint = self.planned_sprint.clone();

        Ok(())
    }
}

/// Compute the rollup of `feature` as of `now`.
pub fn rollup_feature(
    graph: &WorkGraph,
    feature: WorkItemId,
    settings: &RollupSettings,
    now: DateTime<Utc>,
) -> Result<FeatureRollup, RollupError> {
    let root = graph.get(feature).ok_or(RollupError::UnknownItem(feature))?;

    let team = team_string(graph, feature);
    let velocity = velocity(graph, feature, now, settings.velocity_window);

    let leaves = match resolve(graph, feature, settings.resolve)? {
        Resolution::Resolved(leaves) => leaves,
        Resolution::Ineligible(kind) => {
            return Err(RollupError::NotAFeature { id: feature, kind });
        }
        Resolution::NoLinks => {
            debug!("{} is unlinked, using placeholders", feature);
            return Ok(FeatureRollup {
                feature,
                name: root.name.clone(),
                status: None,
                completed: false,
                points: None,
                items: None,
                team,
                velocity,
                projects: Vec::new(),
                planned_sprint: None,
            });
        }
    };

    let leaves = leaves.items(graph);
    let sign_off = root.fields.sign_off.as_deref();
    let accepted = settings.accepted_sign_off.as_str();

    let status = apply_sign_off(aggregate_status(&leaves), sign_off, accepted);
    let projects = project_summaries(&leaves, &settings.sprint_marker);
    let planned_sprint = latest_planned_sprint(&projects);

    Ok(FeatureRollup {
        feature,
        name: root.name.clone(),
        status: Some(status),
        completed: is_completed(&leaves, sign_off, accepted),
        points: Some(points_breakdown(&leaves)),
        items: Some(item_counts(&leaves)),
        team,
        velocity,
        projects,
        planned_sprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::*;
    use crate::models::{ItemKind, TrackingMode, WorkItem};

    fn both() -> RollupSettings {
        RollupSettings {
            resolve: ResolveOptions {
                follow_child_links: true,
                follow_milestone_links: true,
            },
            ..RollupSettings::default()
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn two_story_graph(feature: WorkItem) -> WorkGraph {
        GraphBuilder::new()
            .project("Program", TrackingMode::Points)
            .project("Team - A", TrackingMode::Points)
            .item(feature)
            .item(story(2, "Team - A", Status::Completed, 3))
            .item(story(3, "Team - A", Status::InProgress, 5))
            .build()
    }

    fn linked_feature() -> WorkItem {
        let mut feature = item(1, ItemKind::BacklogItem, "Program");
        feature.links = vec![WorkItemId(2), WorkItemId(3)];
        feature
    }

    #[test]
    fn test_two_linked_stories() {
        let graph = two_story_graph(linked_feature());
        let rollup = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();

        assert_eq!(rollup.status, Some(Status::InProgress));
        assert!(!rollup.completed);

        let points = rollup.points.unwrap();
        assert_eq!(points.total, 8);
        assert_eq!(points.completed, 3);

        let items = rollup.items.unwrap();
        assert_eq!(items.completed, 1);
        assert_eq!(items.total, 2);
    }

    #[test]
    fn test_out_of_range_velocity_window_does_not_panic() {
        let mut config = crate::config::RollupConfig::default();
        config.follow_child_links = true;
        config.velocity_window_days = 1_000_000_000_000;
        let settings = RollupSettings::from(&config);

        let graph = two_story_graph(linked_feature());
        let rollup = rollup_feature(&graph, WorkItemId(1), &settings, now()).unwrap();
        assert_eq!(rollup.velocity, 0);
        assert_eq!(rollup.points.map(|p| p.total), Some(8));
    }

    #[test]
    fn test_unlinked_feature_gets_placeholders() {
        let mut feature = item(1, ItemKind::BacklogItem, "Program");
        feature.fields.planned_sprint = Some("S7".to_string());
        let mut graph = two_story_graph(feature);

        let rollup = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        assert!(!rollup.is_linked());
        assert_eq!(rollup.points, None);
        assert_eq!(rollup.items, None);
        assert!(!rollup.completed);
        assert_eq!(rollup.planned_sprint, None);

        rollup.apply(&mut graph, "").unwrap();
        let feature = graph.get(WorkItemId(1)).unwrap();
        assert_eq!(feature.fields.planned_sprint, None);
        assert_eq!(feature.status, Status::NoStatus);
        assert_eq!(feature.derived.points, None);
    }

    #[test]
    fn test_epic_is_not_a_feature() {
        let graph = GraphBuilder::new()
            .project("Portfolio", TrackingMode::Points)
            .item(item(1, ItemKind::Epic, "Portfolio"))
            .build();

        assert_eq!(
            rollup_feature(&graph, WorkItemId(1), &both(), now()),
            Err(RollupError::NotAFeature {
                id: WorkItemId(1),
                kind: ItemKind::Epic
            })
        );
    }

    #[test]
    fn test_sign_off_downgrades_completed() {
        let mut feature = linked_feature();
        feature.links = vec![WorkItemId(2)];
        feature.fields.sign_off = Some("Waiting for PM".to_string());
        let graph = two_story_graph(feature);

        let rollup = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        assert_eq!(rollup.status, Some(Status::InProgress));
        assert!(!rollup.completed);
    }

    #[test]
    fn test_accepted_sign_off_completes() {
        let mut feature = linked_feature();
        feature.links = vec![WorkItemId(2)];
        feature.fields.sign_off = Some(DEFAULT_ACCEPTED_SIGN_OFF.to_string());
        let mut graph = two_story_graph(feature);

        let rollup = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        assert_eq!(rollup.status, Some(Status::Completed));
        assert!(rollup.completed);

        rollup.apply(&mut graph, "summary").unwrap();
        let feature = graph.get(WorkItemId(1)).unwrap();
        assert_eq!(feature.status, Status::Completed);
        assert!(feature.completed);
        assert_eq!(feature.derived.status_text.as_deref(), Some("Completed"));
        assert_eq!(feature.derived.summary.as_deref(), Some("summary"));
    }

    #[test]
    fn test_rollup_is_repeatable() {
        let graph = two_story_graph(linked_feature());
        let first = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        let second = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_planned_sprint_is_latest_across_projects() {
        let mut a = story(2, "Team - A", Status::NotDone, 1);
        a.fields.planned_sprint = Some("S14".to_string());
        let mut b = story(3, "Team - B", Status::InProgress, 1);
        b.fields.planned_sprint = Some("S15".to_string());

        let mut feature = linked_feature();
        feature.fields.planned_sprint = Some("S1".to_string());

        let graph = GraphBuilder::new()
            .project("Program", TrackingMode::Points)
            .project("Team - A", TrackingMode::Points)
            .project("Team - B", TrackingMode::Points)
            .item(feature)
            .item(a)
            .item(b)
            .build();

        let rollup = rollup_feature(&graph, WorkItemId(1), &both(), now()).unwrap();
        assert_eq!(rollup.projects.len(), 2);
        assert_eq!(rollup.planned_sprint.as_deref(), Some("S15"));
    }
}
