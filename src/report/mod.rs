//! Report rendering.

pub mod generator;
pub mod summary;

pub use generator::{generate_json_report, generate_markdown_report};
pub use summary::{epic_summary, feature_summary, SummarySettings};
