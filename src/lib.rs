//! Feature rollup engine.
//!
//! Derives aggregated status, completion, points, item counts, team,
//! velocity and summary text for features from the team work linked to
//! them, and propagates progress onto scheduled tasks from their single
//! upstream link.
//!
//! The engine reads a [`graph::WorkGraph`] and never mutates it while
//! computing; results are plain values that are written back explicitly.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod recompute;
pub mod report;

pub use error::{GraphError, RollupError};
pub use graph::WorkGraph;
