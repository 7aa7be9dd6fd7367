//! Markdown report generation.
//!
//! This module generates Markdown and JSON reports from the outcome of
//! a batch recomputation.

use crate::models::StatusTally;
use crate::recompute::{EpicEntry, FeatureEntry, ItemRef, RunMetadata, RunReport, TaskEntry};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Feature Rollup Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_features_section(&report.features));
    output.push_str(&generate_team_breakdown_section(&report.features));
    output.push_str(&generate_tasks_section(&report.tasks, &report.blocked));
    output.push_str(&generate_epics_section(&report.epics));
    output.push_str(&generate_unchanged_section(&report.unchanged));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Snapshot:** `{}`\n", metadata.source));
    section.push_str(&format!(
        "- **Evaluated At:** {}\n",
        metadata.evaluated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Generated At:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Work Items:** {}\n", metadata.items));
    section.push_str(&format!("- **Items Recomputed:** {}\n", metadata.jobs));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// `completed/total`, or blank while there is no value.
fn ratio(tally: Option<StatusTally>) -> String {
    tally
        .map(|t| format!("{}/{}", t.completed, t.total))
        .unwrap_or_default()
}

/// Generate the feature table.
fn generate_features_section(features: &[FeatureEntry]) -> String {
    let mut section = String::new();

    section.push_str("## Features\n\n");

    if features.is_empty() {
        section.push_str("No features were recomputed.\n\n");
        return section;
    }

    section.push_str("| Feature | Status | Done | Points | Items | Team | Velocity | Planned Sprint |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|:---|:---:|:---|\n");

    for entry in features {
        let rollup = &entry.rollup;
        section.push_str(&format!(
            "| {} {} | {} | {} | {} | {} | {} | {} | {} |\n",
            rollup.feature,
            rollup.name,
            rollup.status.map(|s| s.to_string()).unwrap_or_default(),
            if rollup.completed { "✅" } else { "" },
            ratio(rollup.points),
            ratio(rollup.items),
            rollup.team,
            rollup.velocity,
            rollup.planned_sprint.as_deref().unwrap_or(""),
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-team breakdown of every linked feature.
fn generate_team_breakdown_section(features: &[FeatureEntry]) -> String {
    let linked: Vec<&FeatureEntry> = features.iter().filter(|e| e.rollup.is_linked()).collect();
    if linked.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Team Breakdown\n\n");

    for entry in linked {
        section.push_str(&format!(
            "### {} {}\n\n",
            entry.rollup.feature, entry.rollup.name
        ));
        section.push_str("```text\n");
        section.push_str(&strip_markup(&entry.summary));
        section.push_str("```\n\n");
    }

    section
}

/// Generate the scheduled-task section.
fn generate_tasks_section(tasks: &[TaskEntry], blocked: &[ItemRef]) -> String {
    if tasks.is_empty() && blocked.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Scheduled Tasks\n\n");

    if !tasks.is_empty() {
        section.push_str("| Task | Status | % Complete | Finish | Remaining | Completed |\n");
        section.push_str("|:---|:---|:---:|:---:|:---:|:---:|\n");

        for entry in tasks {
            let update = &entry.update;
            let work = |value: Option<i64>| value.map(|v| v.to_string()).unwrap_or_default();
            section.push_str(&format!(
                "| {} {} | {} | {}% | {} | {} | {} |\n",
                update.task,
                entry.name,
                update.status,
                update.percent_complete,
                update
                    .finish
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                work(update.work.and_then(|w| w.remaining)),
                work(update.work.and_then(|w| w.completed)),
            ));
        }
        section.push('\n');
    }

    if !blocked.is_empty() {
        section.push_str("### Conflicting Links\n\n");
        section.push_str(
            "These tasks link to a milestone or scheduled task together with other items and were set to Blocked:\n\n",
        );
        for item in blocked {
            section.push_str(&format!("- {} {}\n", item.id, item.name));
        }
        section.push('\n');
    }

    section
}

/// Generate the epic summaries.
fn generate_epics_section(epics: &[EpicEntry]) -> String {
    if epics.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Epics\n\n");

    for epic in epics {
        section.push_str(&format!("### {} {}\n\n", epic.id, epic.name));
        section.push_str("```text\n");
        section.push_str(&strip_markup(&epic.summary));
        section.push_str("```\n\n");
    }

    section
}

/// Generate the list of items left unchanged.
fn generate_unchanged_section(unchanged: &[ItemRef]) -> String {
    if unchanged.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Unchanged\n\n");

    for item in unchanged {
        match item.reason {
            Some(ref reason) => {
                section.push_str(&format!("- {} {} ({})\n", item.id, item.name, reason))
            }
            None => section.push_str(&format!("- {} {}\n", item.id, item.name)),
        }
    }
    section.push('\n');

    section
}

/// Drop the host's inline markup tags.
fn strip_markup(text: &str) -> String {
    ["<CODE>", "</CODE>", "<BOLD>", "</BOLD>"]
        .iter()
        .fold(text.to_string(), |acc, tag| acc.replace(tag, ""))
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by feature-rollup v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::propagator::{LinkSource, ScheduleUpdate, WorkTotals};
    use crate::analysis::rollup::FeatureRollup;
    use crate::models::{Status, WorkItemId};
    use chrono::{NaiveDate, Utc};

    fn rollup(id: u64, name: &str, linked: bool) -> FeatureRollup {
        FeatureRollup {
            feature: WorkItemId(id),
            name: name.to_string(),
            status: linked.then_some(Status::InProgress),
            completed: false,
            points: linked.then_some(StatusTally {
                total: 8,
                completed: 3,
                not_completed: 5,
                in_progress: 5,
                not_done: 0,
                blocked: 0,
            }),
            items: linked.then_some(StatusTally {
                total: 2,
                completed: 1,
                not_completed: 1,
                in_progress: 1,
                not_done: 0,
                blocked: 0,
            }),
            team: if linked { "Rocket".to_string() } else { String::new() },
            velocity: 0,
            projects: Vec::new(),
            planned_sprint: linked.then(|| "S12".to_string()),
        }
    }

    fn create_test_report() -> RunReport {
        RunReport {
            metadata: RunMetadata {
                source: "portfolio.json".to_string(),
                evaluated_at: Utc::now(),
                generated_at: Utc::now(),
                duration_seconds: 0.2,
                items: 12,
                jobs: 4,
            },
            features: vec![
                FeatureEntry {
                    rollup: rollup(10, "Checkout", true),
                    summary: "<CODE>Team            │ Status</CODE>\n".to_string(),
                },
                FeatureEntry {
                    rollup: rollup(11, "Wishlist", false),
                    summary: String::new(),
                },
            ],
            tasks: vec![TaskEntry {
                name: "Release train".to_string(),
                update: ScheduleUpdate {
                    task: WorkItemId(13),
                    source: LinkSource::Milestone(WorkItemId(30)),
                    status: Status::InProgress,
                    completed: false,
                    percent_complete: 40,
                    finish: NaiveDate::from_ymd_opt(2026, 11, 15),
                    time_zone: None,
                    work: Some(WorkTotals {
                        remaining: Some(12),
                        completed: None,
                    }),
                },
            }],
            blocked: vec![ItemRef {
                id: WorkItemId(14),
                name: "Hardening".to_string(),
                reason: Some("conflicting upstream links".to_string()),
            }],
            epics: vec![EpicEntry {
                id: WorkItemId(1),
                name: "Mobile".to_string(),
                summary: "<BOLD>Development (0)</BOLD>\n".to_string(),
            }],
            unchanged: vec![ItemRef {
                id: WorkItemId(11),
                name: "Wishlist".to_string(),
                reason: Some("unlinked".to_string()),
            }],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Feature Rollup Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Features"));
        assert!(markdown.contains("## Scheduled Tasks"));
        assert!(markdown.contains("## Epics"));
        assert!(markdown.contains("- #11 Wishlist (unlinked)"));
        assert!(markdown.contains("| #13 Release train | In progress | 40% | 2026-11-15 | 12 |  |"));
        assert!(!markdown.contains("<CODE>"));
        assert!(!markdown.contains("<BOLD>"));
    }

    #[test]
    fn test_unlinked_feature_renders_blank() {
        let section = generate_features_section(&create_test_report().features);

        assert!(section.contains("| #10 Checkout | In progress |  | 3/8 | 1/2 | Rocket | 0 | S12 |"));
        assert!(section.contains("| #11 Wishlist |  |  |  |  |  | 0 |  |"));
    }

    #[test]
    fn test_team_breakdown_skips_unlinked() {
        let section = generate_team_breakdown_section(&create_test_report().features);
        assert!(section.contains("### #10 Checkout"));
        assert!(!section.contains("Wishlist"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let section = generate_metadata_section(&create_test_report().metadata);

        assert!(section.contains("portfolio.json"));
        assert!(section.contains("- **Work Items:** 12"));
        assert!(section.contains("- **Items Recomputed:** 4"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["features"][0]["feature"], 10);
        assert_eq!(value["features"][1]["points"], serde_json::Value::Null);
        assert_eq!(value["tasks"][0]["source"]["kind"], "milestone");
        assert_eq!(value["unchanged"][0]["reason"], "unlinked");
    }
}
