//! Leaf-set resolution for a feature.
//!
//! A feature collects work from team projects through its links: linked
//! milestones contribute the backlog items tagged to them, linked backlog
//! items contribute themselves. Each contribution is expanded down the
//! owned hierarchy to its leaves, deleted leaves are dropped, and the
//! union is deduplicated.
//!
//! Links are followed exactly one hop, so link cycles cannot cause
//! unbounded traversal.

use crate::error::RollupError;
use crate::graph::WorkGraph;
use crate::models::{ItemKind, Status, WorkItem, WorkItemId};
use std::collections::HashSet;
use tracing::debug;

/// Which kinds of links contribute to a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Follow links to uncommitted backlog items.
    pub follow_child_links: bool,
    /// Follow links to milestones.
    pub follow_milestone_links: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            follow_child_links: false,
            follow_milestone_links: true,
        }
    }
}

/// Deduplicated set of contributing leaves, kept in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafSet {
    ids: Vec<WorkItemId>,
    seen: HashSet<WorkItemId>,
}

impl LeafSet {
    /// Adds a leaf, returning false if it was already present.
    pub fn insert(&mut self, id: WorkItemId) -> bool {
        if self.seen.insert(id) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: WorkItemId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[WorkItemId] {
        &self.ids
    }

    /// Look the leaves up in `graph`.
    pub fn items<'g>(&self, graph: &'g WorkGraph) -> Vec<&'g WorkItem> {
        self.ids.iter().filter_map(|id| graph.get(*id)).collect()
    }
}

/// Outcome of resolving a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The feature's contributing leaves (possibly empty).
    Resolved(LeafSet),
    /// The root is of a kind that can never be a feature.
    Ineligible(ItemKind),
    /// The root is eligible but has no qualifying links yet.
    NoLinks,
}

impl Resolution {
    pub fn leaves(&self) -> Option<&LeafSet> {
        match self {
            Resolution::Resolved(leaves) => Some(leaves),
            _ => None,
        }
    }
}

/// Milestones in team projects linked to `feature`.
pub fn linked_team_milestones(graph: &WorkGraph, feature: WorkItemId) -> Vec<&WorkItem> {
    graph
        .linked(feature)
        .filter(|item| item.kind == ItemKind::Milestone && item.is_in_team_project())
        .collect()
}

/// Uncommitted backlog items in team projects linked to `feature`.
pub fn linked_team_stories(graph: &WorkGraph, feature: WorkItemId) -> Vec<&WorkItem> {
    graph
        .linked(feature)
        .filter(|item| item.kind.is_uncommitted_backlog_item() && item.is_in_team_project())
        .collect()
}

/// Resolve the contributing leaf set of `feature`.
pub fn resolve(
    graph: &WorkGraph,
    feature: WorkItemId,
    options: ResolveOptions,
) -> Result<Resolution, RollupError> {
    let root = graph.get(feature).ok_or(RollupError::UnknownItem(feature))?;

    if !root.kind.is_feature_like() {
        debug!("{} ({}) is not a feature", feature, root.kind);
        return Ok(Resolution::Ineligible(root.kind));
    }

    let milestones = if options.follow_milestone_links {
        linked_team_milestones(graph, feature)
    } else {
        Vec::new()
    };
    let stories = if options.follow_child_links {
        linked_team_stories(graph, feature)
    } else {
        Vec::new()
    };

    if milestones.is_empty() && stories.is_empty() {
        debug!("{} has no qualifying links", feature);
        return Ok(Resolution::NoLinks);
    }

    let mut leaves = LeafSet::default();

    for milestone in &milestones {
        let Some(summary) = graph.milestone_summary(milestone.id) else {
            continue;
        };
        for task in summary.dependent_tasks {
            let Some(task) = graph.get(task) else {
                continue;
            };
            if task.kind.is_uncommitted_backlog_item() {
                collect_leaves(graph, task.id, &mut leaves);
            }
        }
    }

    for story in &stories {
        collect_leaves(graph, story.id, &mut leaves);
    }

    debug!(
        "{} resolved to {} leaves via {} milestones and {} stories",
        feature,
        leaves.len(),
        milestones.len(),
        stories.len()
    );

    Ok(Resolution::Resolved(leaves))
}

fn collect_leaves(graph: &WorkGraph, root: WorkItemId, leaves: &mut LeafSet) {
    for leaf in graph.leaves(root) {
        if leaf.leaf_status() != Status::Deleted {
            leaves.insert(leaf.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::*;
    use crate::models::TrackingMode;

    const PROGRAM: &str = "Program";
    const TEAM_A: &str = "Team - A";

    fn base() -> GraphBuilder {
        GraphBuilder::new()
            .project(PROGRAM, TrackingMode::Points)
            .project(TEAM_A, TrackingMode::Points)
            .project("Archive", TrackingMode::Points)
    }

    fn feature(links: &[u64]) -> WorkItem {
        let mut feature = item(1, ItemKind::BacklogItem, PROGRAM);
        feature.links = links.iter().copied().map(WorkItemId).collect();
        feature
    }

    fn both() -> ResolveOptions {
        ResolveOptions {
            follow_child_links: true,
            follow_milestone_links: true,
        }
    }

    #[test]
    fn test_epic_is_ineligible() {
        let graph = base().item(item(1, ItemKind::Epic, PROGRAM)).build();
        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        assert_eq!(resolution, Resolution::Ineligible(ItemKind::Epic));
    }

    #[test]
    fn test_unknown_item() {
        let graph = base().build();
        assert_eq!(
            resolve(&graph, WorkItemId(42), both()),
            Err(RollupError::UnknownItem(WorkItemId(42)))
        );
    }

    #[test]
    fn test_unlinked_feature() {
        let graph = base().item(feature(&[])).build();
        assert_eq!(
            resolve(&graph, WorkItemId(1), both()).unwrap(),
            Resolution::NoLinks
        );
    }

    #[test]
    fn test_links_outside_team_projects_are_ignored() {
        let graph = base()
            .item(feature(&[2]))
            .item(story(2, "Archive", Status::NotDone, 1))
            .build();
        assert_eq!(
            resolve(&graph, WorkItemId(1), both()).unwrap(),
            Resolution::NoLinks
        );
    }

    #[test]
    fn test_story_links_need_option() {
        let graph = base()
            .item(feature(&[2]))
            .item(story(2, TEAM_A, Status::NotDone, 1))
            .build();

        let resolution = resolve(&graph, WorkItemId(1), ResolveOptions::default()).unwrap();
        assert_eq!(resolution, Resolution::NoLinks);

        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        assert_eq!(resolution.leaves().map(LeafSet::len), Some(1));
    }

    #[test]
    fn test_committed_items_are_not_followed() {
        let graph = base()
            .item(feature(&[2]))
            .item(item(2, ItemKind::CommittedBacklogItem, TEAM_A))
            .build();
        assert_eq!(
            resolve(&graph, WorkItemId(1), both()).unwrap(),
            Resolution::NoLinks
        );
    }

    #[test]
    fn test_milestone_and_direct_paths_deduplicate() {
        let mut parent = story(3, TEAM_A, Status::NoStatus, 0);
        parent.children = vec![WorkItemId(4), WorkItemId(5)];
        parent.milestones = vec![WorkItemId(2)];

        let graph = base()
            .item(feature(&[2, 3]))
            .item(item(2, ItemKind::Milestone, TEAM_A))
            .item(parent)
            .item(story(4, TEAM_A, Status::Completed, 2))
            .item(story(5, TEAM_A, Status::NotDone, 3))
            .build();

        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        let leaves = resolution.leaves().unwrap();
        assert_eq!(leaves.ids(), &[WorkItemId(4), WorkItemId(5)]);
        assert!(!leaves.contains(WorkItemId(3)));
    }

    #[test]
    fn test_deleted_leaves_are_dropped() {
        let mut deleted = story(3, TEAM_A, Status::NotDone, 8);
        deleted.aggregated_status = Some(Status::Deleted);

        let graph = base()
            .item(feature(&[2, 3]))
            .item(story(2, TEAM_A, Status::InProgress, 1))
            .item(deleted)
            .build();

        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        assert_eq!(resolution.leaves().unwrap().ids(), &[WorkItemId(2)]);
    }

    #[test]
    fn test_deleted_leaf_dropped_on_every_path() {
        let mut parent = story(3, TEAM_A, Status::NoStatus, 0);
        parent.milestones = vec![WorkItemId(2)];
        parent.children = vec![WorkItemId(4), WorkItemId(5)];
        let deleted = story(4, TEAM_A, Status::Deleted, 8);

        let graph = base()
            .item(feature(&[2, 4]))
            .item(item(2, ItemKind::Milestone, TEAM_A))
            .item(parent)
            .item(deleted)
            .item(story(5, TEAM_A, Status::InProgress, 2))
            .build();

        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        assert_eq!(resolution.leaves().unwrap().ids(), &[WorkItemId(5)]);

        let milestone_only = ResolveOptions::default();
        let resolution = resolve(&graph, WorkItemId(1), milestone_only).unwrap();
        assert_eq!(resolution.leaves().unwrap().ids(), &[WorkItemId(5)]);
    }

    #[test]
    fn test_milestone_keeps_only_uncommitted_backlog_items() {
        let mut committed = item(3, ItemKind::CommittedBacklogItem, TEAM_A);
        committed.milestones = vec![WorkItemId(2)];
        let mut backlog = story(4, TEAM_A, Status::NotDone, 1);
        backlog.milestones = vec![WorkItemId(2)];

        let graph = base()
            .item(feature(&[2]))
            .item(item(2, ItemKind::Milestone, TEAM_A))
            .item(committed)
            .item(backlog)
            .build();

        let resolution = resolve(&graph, WorkItemId(1), ResolveOptions::default()).unwrap();
        assert_eq!(resolution.leaves().unwrap().ids(), &[WorkItemId(4)]);
    }

    #[test]
    fn test_milestone_without_tasks_resolves_empty() {
        let graph = base()
            .item(feature(&[2]))
            .item(item(2, ItemKind::Milestone, TEAM_A))
            .build();

        let resolution = resolve(&graph, WorkItemId(1), ResolveOptions::default()).unwrap();
        assert!(resolution.leaves().unwrap().is_empty());
    }

    #[test]
    fn test_linked_features_cycle_is_bounded() {
        // Two features linked to each other and to the same story.
        let mut other = item(5, ItemKind::BacklogItem, PROGRAM);
        other.links = vec![WorkItemId(1), WorkItemId(2)];

        let graph = base()
            .item(feature(&[2, 5]))
            .item(story(2, TEAM_A, Status::NotDone, 1))
            .item(other)
            .build();

        let resolution = resolve(&graph, WorkItemId(1), both()).unwrap();
        assert_eq!(resolution.leaves().unwrap().ids(), &[WorkItemId(2)]);
    }
}
