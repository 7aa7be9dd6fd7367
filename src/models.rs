//! Data models for the rollup engine.
//!
//! This module contains the work-item graph vocabulary: identities,
//! kinds, statuses, projects, the typed custom fields the engine reads,
//! and the derived fields it writes back onto a feature.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Project names starting with this prefix are owned by a team and take
/// part in rollups. The remainder of the name is the team name.
pub const TEAM_PROJECT_PREFIX: &str = "Team - ";

/// Identity of a work item within a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u64);

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Portfolio epic or program-level container.
    Epic,
    /// Backlog item that is not committed to any schedule yet.
    BacklogItem,
    /// Backlog item committed to a sprint or a project schedule.
    CommittedBacklogItem,
    /// Task on a project schedule.
    ScheduledTask,
    /// Release milestone.
    Milestone,
}

impl ItemKind {
    /// Whether an item of this kind may be the root of a rollup.
    pub fn is_feature_like(self) -> bool {
        matches!(
            self,
            ItemKind::BacklogItem | ItemKind::ScheduledTask | ItemKind::Milestone
        )
    }

    /// Exactly `BacklogItem`. Committed backlog items do not count.
    pub fn is_uncommitted_backlog_item(self) -> bool {
        self == ItemKind::BacklogItem
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Epic => write!(f, "epic"),
            ItemKind::BacklogItem => write!(f, "backlog item"),
            ItemKind::CommittedBacklogItem => write!(f, "committed backlog item"),
            ItemKind::ScheduledTask => write!(f, "scheduled task"),
            ItemKind::Milestone => write!(f, "milestone"),
        }
    }
}

/// Work item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    NoStatus,
    NotDone,
    InProgress,
    Completed,
    Blocked,
    Deleted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NoStatus => write!(f, "No status"),
            Status::NotDone => write!(f, "Not done"),
            Status::InProgress => write!(f, "In progress"),
            Status::Completed => write!(f, "Completed"),
            Status::Blocked => write!(f, "Blocked"),
            Status::Deleted => write!(f, "Deleted"),
        }
    }
}

impl Status {
    /// Collapse a set of statuses into one.
    ///
    /// Rules are checked in order: empty is `NotDone`, any `Blocked` wins,
    /// then all `Completed`, then all `NotDone`/`NoStatus`, and anything
    /// else is `InProgress`.
    pub fn aggregate<I>(statuses: I) -> Status
    where
        I: IntoIterator<Item = Status>,
    {
        let statuses: Vec<Status> = statuses.into_iter().collect();

        if statuses.is_empty() {
            return Status::NotDone;
        }
        if statuses.iter().any(|s| *s == Status::Blocked) {
            return Status::Blocked;
        }
        if statuses.iter().all(|s| *s == Status::Completed) {
            return Status::Completed;
        }
        if statuses
            .iter()
            .all(|s| matches!(s, Status::NotDone | Status::NoStatus))
        {
            return Status::NotDone;
        }
        Status::InProgress
    }
}

/// How a project tracks progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Agile project, progress measured in points.
    #[default]
    Points,
    /// Traditional project, progress measured in scheduled duration.
    Duration,
}

/// A project owning work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub tracking: TrackingMode,
}

/// The custom fields the engine knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    SignOff,
    PlannedSprint,
    RemainingWork,
    CompletedWork,
    StatusLastChanged,
}

impl FieldKey {
    pub const ALL: [FieldKey; 5] = [
        FieldKey::SignOff,
        FieldKey::PlannedSprint,
        FieldKey::RemainingWork,
        FieldKey::CompletedWork,
        FieldKey::StatusLastChanged,
    ];

    /// Column name as shown in the host.
    pub fn name(self) -> &'static str {
        match self {
            FieldKey::SignOff => "Sign off",
            FieldKey::PlannedSprint => "Planned sprint",
            FieldKey::RemainingWork => "Remaining work",
            FieldKey::CompletedWork => "Completed work",
            FieldKey::StatusLastChanged => "Status last changed",
        }
    }

    pub fn from_name(name: &str) -> Option<FieldKey> {
        FieldKey::ALL.into_iter().find(|key| key.name() == name)
    }
}

/// Integer work fields that are summed over a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkField {
    RemainingWork,
    CompletedWork,
}

/// Custom field values of a work item.
///
/// Known fields are typed; anything else lands in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFields {
    /// Present (even when empty) only if the project defines the column.
    #[serde(rename = "Sign off", default, skip_serializing_if = "Option::is_none")]
    pub sign_off: Option<String>,

    #[serde(rename = "Planned sprint", default, skip_serializing_if = "Option::is_none")]
    pub planned_sprint: Option<String>,

    #[serde(rename = "Remaining work", default, skip_serializing_if = "Option::is_none")]
    pub remaining_work: Option<i64>,

    #[serde(rename = "Completed work", default, skip_serializing_if = "Option::is_none")]
    pub completed_work: Option<i64>,

    #[serde(
        rename = "Status last changed",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_last_changed: Option<DateTime<Utc>>,

    /// Open-ended fields without a typed accessor.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CustomFields {
    pub fn work(&self, field: WorkField) -> Option<i64> {
        match field {
            WorkField::RemainingWork => self.remaining_work,
            WorkField::CompletedWork => self.completed_work,
        }
    }

    pub fn set_work(&mut self, field: WorkField, value: Option<i64>) {
        match field {
            WorkField::RemainingWork => self.remaining_work = value,
            WorkField::CompletedWork => self.completed_work = value,
        }
    }

    /// Look a field up by its column name and render it as text.
    pub fn display_value(&self, name: &str) -> Option<String> {
        match FieldKey::from_name(name) {
            Some(FieldKey::SignOff) => self.sign_off.clone(),
            Some(FieldKey::PlannedSprint) => self.planned_sprint.clone(),
            Some(FieldKey::RemainingWork) => self.remaining_work.map(|v| v.to_string()),
            Some(FieldKey::CompletedWork) => self.completed_work.map(|v| v.to_string()),
            Some(FieldKey::StatusLastChanged) => self.status_last_changed.map(|v| v.to_rfc3339()),
            None => self.extra.get(name).and_then(|value| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
        }
    }
}

/// Per-status-category totals over a leaf set.
///
/// Used both for point sums and for item counts. Categories are
/// independent filters, so `completed + not_completed == total` while the
/// remaining buckets need not add up to anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTally {
    pub total: u64,
    pub completed: u64,
    pub not_completed: u64,
    pub in_progress: u64,
    pub not_done: u64,
    pub blocked: u64,
}

/// Fields the engine writes back onto a feature.
///
/// `None` means "no value yet" and renders blank, which is different from
/// a value of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<StatusTally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<StatusTally>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl DerivedFields {
    pub fn is_empty(&self) -> bool {
        *self == DerivedFields::default()
    }
}

/// A node of the work-item graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub name: String,
    pub kind: ItemKind,
    /// Name of the owning project.
    pub project: String,
    #[serde(default)]
    pub status: Status,
    /// Host-computed status over the item's own subtree, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_status: Option<Status>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub duration_days: f64,
    #[serde(default)]
    pub estimated_days: f64,
    /// Owned children, in order.
    #[serde(default)]
    pub children: Vec<WorkItemId>,
    /// Symmetric cross-project references.
    #[serde(default)]
    pub links: Vec<WorkItemId>,
    /// Milestones this item is tagged to.
    #[serde(default)]
    pub milestones: Vec<WorkItemId>,
    /// Milestone date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub percent_complete: u8,
    #[serde(default)]
    pub fields: CustomFields,
    #[serde(default, skip_serializing_if = "DerivedFields::is_empty")]
    pub derived: DerivedFields,
}

impl WorkItem {
    /// Creates a childless, unlinked item with default metadata.
    pub fn new(id: u64, name: &str, kind: ItemKind, project: &str) -> Self {
        Self {
            id: WorkItemId(id),
            name: name.to_string(),
            kind,
            project: project.to_string(),
            status: Status::NoStatus,
            aggregated_status: None,
            completed: false,
            points: 0,
            duration_days: 0.0,
            estimated_days: 0.0,
            children: Vec::new(),
            links: Vec::new(),
            milestones: Vec::new(),
            date: None,
            start: None,
            finish: None,
            time_zone: None,
            percent_complete: 0,
            fields: CustomFields::default(),
            derived: DerivedFields::default(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Team name if the item lives in a team-owned project.
    pub fn team_name(&self) -> Option<&str> {
        self.project.strip_prefix(TEAM_PROJECT_PREFIX)
    }

    pub fn is_in_team_project(&self) -> bool {
        self.team_name().is_some()
    }

    /// Aggregated status of a leaf: the host value if supplied, else its own.
    pub fn leaf_status(&self) -> Status {
        self.aggregated_status.unwrap_or(self.status)
    }

    /// A leaf counts as completed when flagged or when its status says so.
    pub fn leaf_completed(&self) -> bool {
        self.completed || self.leaf_status() == Status::Completed
    }
}
