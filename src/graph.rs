//! In-memory work-item graph.
//!
//! `WorkGraph` owns every item of a snapshot, indexed by id. Ownership
//! (`children`) forms a forest, links are symmetric cross references, and
//! milestone tags give each milestone its dependent-task set. Everything
//! the host would otherwise compute for us (aggregated points, durations,
//! work fields, milestone summaries) is derived here from the subtree.

use crate::error::GraphError;
use crate::models::{ItemKind, Project, Status, TrackingMode, WorkField, WorkItem, WorkItemId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Serialized form of a graph, as exchanged with the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub items: Vec<WorkItem>,
}

/// What the host reports about a milestone.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneSummary {
    /// Items tagged to the milestone, in id order.
    pub dependent_tasks: Vec<WorkItemId>,
    pub points: u64,
    pub points_not_done: u64,
    pub duration_days: f64,
    pub duration_days_not_done: f64,
    /// Tracking mode of the milestone's project.
    pub tracking: TrackingMode,
}

/// Validated work-item graph.
#[derive(Debug, Clone, Default)]
pub struct WorkGraph {
    projects: BTreeMap<String, Project>,
    items: BTreeMap<WorkItemId, WorkItem>,
    parents: HashMap<WorkItemId, WorkItemId>,
    dependents: HashMap<WorkItemId, Vec<WorkItemId>>,
}

impl WorkGraph {
    /// Parse and validate a JSON snapshot.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Build a graph, checking references and making links symmetric.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, GraphError> {
        let projects: BTreeMap<String, Project> = snapshot
            .projects
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        let mut items = BTreeMap::new();
        for item in snapshot.items {
            if !projects.contains_key(&item.project) {
                return Err(GraphError::UnknownProject {
                    item: item.id,
                    project: item.project.clone(),
                });
            }
            let id = item.id;
            if items.insert(id, item).is_some() {
                return Err(GraphError::DuplicateItem(id));
            }
        }

        let mut parents = HashMap::new();
        let mut link_pairs: BTreeMap<WorkItemId, BTreeSet<WorkItemId>> = BTreeMap::new();
        let mut dependents: HashMap<WorkItemId, Vec<WorkItemId>> = HashMap::new();

        for item in items.values() {
            for child in &item.children {
                if !items.contains_key(child) {
                    return Err(GraphError::UnknownReference {
                        from: item.id,
                        to: *child,
                    });
                }
                if *child == item.id {
                    return Err(GraphError::Cycle(item.id));
                }
                if parents.insert(*child, item.id).is_some() {
                    return Err(GraphError::MultipleParents { child: *child });
                }
            }

            for link in &item.links {
                if !items.contains_key(link) {
                    return Err(GraphError::UnknownReference {
                        from: item.id,
                        to: *link,
                    });
                }
                if *link == item.id {
                    return Err(GraphError::SelfLink(item.id));
                }
                link_pairs.entry(item.id).or_default().insert(*link);
                link_pairs.entry(*link).or_default().insert(item.id);
            }

            for milestone in &item.milestones {
                let target = items.get(milestone).ok_or(GraphError::UnknownReference {
                    from: item.id,
                    to: *milestone,
                })?;
                if target.kind != ItemKind::Milestone {
                    return Err(GraphError::NotAMilestone {
                        from: item.id,
                        to: *milestone,
                    });
                }
                let tasks = dependents.entry(*milestone).or_default();
                if !tasks.contains(&item.id) {
                    tasks.push(item.id);
                }
            }
        }

        for (id, item) in items.iter_mut() {
            item.links = link_pairs
                .get(id)
                .map(|links| links.iter().copied().collect())
                .unwrap_or_default();
        }

        let graph = Self {
            projects,
            items,
            parents,
            dependents,
        };
        graph.check_acyclic()?;

        debug!(
            "Loaded graph with {} projects and {} items",
            graph.projects.len(),
            graph.items.len()
        );
        Ok(graph)
    }

    /// With unique parents, a cycle exists iff some parent chain is longer
    /// than the number of items.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let limit = self.items.len();
        for id in self.items.keys() {
            let mut current = *id;
            let mut steps = 0;
            while let Some(parent) = self.parents.get(&current) {
                steps += 1;
                if steps > limit {
                    return Err(GraphError::Cycle(*id));
                }
                current = *parent;
            }
        }
        Ok(())
    }

    /// Serialize the graph back into snapshot form.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            projects: self.projects.values().cloned().collect(),
            items: self.items.values().cloned().collect(),
        }
    }

    pub fn get(&self, id: WorkItemId) -> Option<&WorkItem> {
        self.items.get(&id)
    }

    /// Mutable access for writing derived fields back.
    pub fn get_mut(&mut self, id: WorkItemId) -> Option<&mut WorkItem> {
        self.items.get_mut(&id)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn parent(&self, id: WorkItemId) -> Option<&WorkItem> {
        self.parents.get(&id).and_then(|parent| self.items.get(parent))
    }

    /// Items linked to `id`.
    pub fn linked(&self, id: WorkItemId) -> impl Iterator<Item = &WorkItem> {
        self.items
            .get(&id)
            .map(|item| item.links.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|link| self.items.get(link))
    }

    /// Leaves of the owned subtree rooted at `id`.
    ///
    /// A childless item is its own single leaf. Ancestors are never
    /// returned. Uses an explicit stack, so depth is not limited by the
    /// call stack.
    pub fn leaves(&self, id: WorkItemId) -> Vec<&WorkItem> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            let Some(item) = self.items.get(&current) else {
                continue;
            };
            if item.is_leaf() {
                leaves.push(item);
            } else {
                stack.extend(item.children.iter().rev());
            }
        }

        leaves
    }

    /// Leaves strictly below `id`; empty for a childless item.
    pub fn descendant_leaves(&self, id: WorkItemId) -> Vec<&WorkItem> {
        match self.items.get(&id) {
            Some(item) if !item.is_leaf() => self.leaves(id),
            _ => Vec::new(),
        }
    }

    /// Host-style aggregated status over the item's subtree.
    pub fn aggregated_status(&self, id: WorkItemId) -> Option<Status> {
        let item = self.items.get(&id)?;
        if let Some(status) = item.aggregated_status {
            return Some(status);
        }
        if item.is_leaf() {
            return Some(item.status);
        }
        Some(Status::aggregate(
            self.leaves(id).into_iter().map(WorkItem::leaf_status),
        ))
    }

    pub fn aggregated_points(&self, id: WorkItemId) -> u64 {
        self.leaves(id).iter().map(|leaf| u64::from(leaf.points)).sum()
    }

    pub fn aggregated_points_not_done(&self, id: WorkItemId) -> u64 {
        self.leaves(id)
            .iter()
            .filter(|leaf| !leaf.leaf_completed())
            .map(|leaf| u64::from(leaf.points))
            .sum()
    }

    pub fn aggregated_duration(&self, id: WorkItemId) -> f64 {
        self.leaves(id).iter().map(|leaf| leaf.duration_days).sum()
    }

    pub fn aggregated_duration_not_done(&self, id: WorkItemId) -> f64 {
        self.leaves(id)
            .iter()
            .filter(|leaf| !leaf.leaf_completed())
            .map(|leaf| leaf.duration_days)
            .sum()
    }

    pub fn aggregated_estimated_days(&self, id: WorkItemId) -> f64 {
        self.leaves(id).iter().map(|leaf| leaf.estimated_days).sum()
    }

    /// Sum of a work field over the subtree; `None` if no leaf sets it.
    pub fn aggregated_work(&self, id: WorkItemId, field: WorkField) -> Option<i64> {
        self.leaves(id)
            .iter()
            .filter_map(|leaf| leaf.fields.work(field))
            .fold(None, |total, value| Some(total.unwrap_or(0) + value))
    }

    /// Summary of a milestone; `None` if `id` is not a milestone.
    pub fn milestone_summary(&self, id: WorkItemId) -> Option<MilestoneSummary> {
        let milestone = self.items.get(&id)?;
        if milestone.kind != ItemKind::Milestone {
            return None;
        }

        let mut dependent_tasks = self.dependents.get(&id).cloned().unwrap_or_default();
        dependent_tasks.sort();

        let mut summary = MilestoneSummary {
            dependent_tasks,
            points: 0,
            points_not_done: 0,
            duration_days: 0.0,
            duration_days_not_done: 0.0,
            tracking: self
                .projects
                .get(&milestone.project)
                .map(|p| p.tracking)
                .unwrap_or_default(),
        };

        for task in &summary.dependent_tasks {
            summary.points += self.aggregated_points(*task);
            summary.points_not_done += self.aggregated_points_not_done(*task);
            summary.duration_days += self.aggregated_duration(*task);
            summary.duration_days_not_done += self.aggregated_duration_not_done(*task);
        }

        Some(summary)
    }

    /// Names of the milestones an item is tagged to.
    pub fn milestone_names(&self, id: WorkItemId) -> Vec<&str> {
        self.items
            .get(&id)
            .map(|item| item.milestones.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|m| self.items.get(m))
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Whether an item with the same name sits on the schedule of the
    /// item's own project. A scheduled item finds itself.
    pub fn is_scheduled_in_project(&self, id: WorkItemId) -> bool {
        let Some(item) = self.items.get(&id) else {
            return false;
        };

        self.items.values().any(|other| {
            other.project == item.project
                && other.name == item.name
                && matches!(
                    other.kind,
                    ItemKind::ScheduledTask
                        | ItemKind::CommittedBacklogItem
                )
        })
    }
}
