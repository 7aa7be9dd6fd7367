//! Analysis modules.
//!
//! Resolution of a feature's leaf set, the aggregations over it, the
//! feature rollup built from both, and single-link schedule propagation.

pub mod aggregator;
pub mod propagator;
pub mod resolver;
pub mod rollup;

pub use aggregator::{ProjectSummary, team_string, velocity};
pub use propagator::{propagate, LinkSource, Propagation, ScheduleUpdate, WorkTotals};
pub use resolver::{resolve, LeafSet, Resolution, ResolveOptions};
pub use rollup::{rollup_feature, FeatureRollup, RollupSettings, DEFAULT_ACCEPTED_SIGN_OFF};
