//! Error types for the rollup engine.
//!
//! Only genuine defects surface as errors here. The expected
//! "nothing to roll up yet" states are ordinary values
//! ([`crate::analysis::Resolution::NoLinks`],
//! [`crate::analysis::Propagation::NoInput`]).

use crate::models::{ItemKind, WorkItemId};
use thiserror::Error;

/// A snapshot that cannot be turned into a consistent work-item graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to parse graph snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("work item {0} appears more than once")]
    DuplicateItem(WorkItemId),

    #[error("work item {item} belongs to unknown project '{project}'")]
    UnknownProject { item: WorkItemId, project: String },

    #[error("work item {from} references unknown item {to}")]
    UnknownReference { from: WorkItemId, to: WorkItemId },

    #[error("work item {child} has more than one parent")]
    MultipleParents { child: WorkItemId },

    #[error("ownership cycle through work item {0}")]
    Cycle(WorkItemId),

    #[error("work item {0} is linked to itself")]
    SelfLink(WorkItemId),

    #[error("work item {from} is tagged to {to}, which is not a milestone")]
    NotAMilestone { from: WorkItemId, to: WorkItemId },
}

/// Hard failures of a single rollup invocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RollupError {
    #[error("work item {0} not found")]
    UnknownItem(WorkItemId),

    /// The rollup rule was bound to an item that can never be a feature.
    #[error("work item {id} of kind {kind} cannot be a rollup root")]
    NotAFeature { id: WorkItemId, kind: ItemKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RollupError::NotAFeature {
            id: WorkItemId(7),
            kind: ItemKind::Epic,
        };
        assert_eq!(err.to_string(), "work item #7 of kind epic cannot be a rollup root");

        let err = GraphError::UnknownReference {
            from: WorkItemId(1),
            to: WorkItemId(99),
        };
        assert!(err.to_string().contains("#99"));
    }
}
