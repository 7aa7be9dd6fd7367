//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// feature-rollup - derive feature status from linked team work
///
/// Recomputes aggregated status, points, item counts, team, velocity and
/// summaries for every feature of a portfolio snapshot, and propagates
/// milestone and story progress onto scheduled tasks.
///
/// Examples:
///   feature-rollup --graph portfolio.json
///   feature-rollup --graph portfolio.json --format json --output report.json
///   feature-rollup --graph portfolio.json --feature 101 --feature 102
///   feature-rollup --graph portfolio.json --write-graph updated.json
///   feature-rollup --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Work-item snapshot to recompute (JSON)
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present = "init_config",
        env = "ROLLUP_GRAPH"
    )]
    pub graph: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Defaults to the `output` setting of the config file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the updated snapshot to this file
    #[arg(long, value_name = "FILE")]
    pub write_graph: Option<PathBuf>,

    /// Recompute only this feature (repeatable)
    #[arg(long = "feature", value_name = "ID")]
    pub features: Vec<u64>,

    /// Propagate only onto this scheduled task (repeatable)
    #[arg(long = "task", value_name = "ID")]
    pub tasks: Vec<u64>,

    /// Restrict features to teams of this program
    #[arg(long, value_name = "NAME")]
    pub program: Option<String>,

    /// Evaluation time for velocity (RFC 3339, default: now)
    #[arg(long, value_name = "TIME")]
    pub as_of: Option<String>,

    /// Also follow links to team backlog items
    #[arg(long)]
    pub follow_child_links: bool,

    /// Number of items recomputed in parallel
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rollup.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .rollup.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.graph {
            None => return Err("A snapshot is required (--graph FILE)".to_string()),
            Some(ref path) if !path.is_file() => {
                return Err(format!("Snapshot file does not exist: {}", path.display()));
            }
            Some(_) => {}
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref as_of) = self.as_of {
            if DateTime::parse_from_rfc3339(as_of).is_err() {
                return Err(format!("Invalid --as-of time (expected RFC 3339): {}", as_of));
            }
        }

        if let Some(ref program) = self.program {
            if program.trim().is_empty() {
                return Err("Program name must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Evaluation time: `--as-of` if given and valid, else now.
    pub fn evaluation_time(&self) -> DateTime<Utc> {
        self.as_of
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            graph: Some(PathBuf::from("Cargo.toml")),
            output: None,
            format: OutputFormat::Markdown,
            write_graph: None,
            features: Vec::new(),
            tasks: Vec::new(),
            program: None,
            as_of: None,
            follow_child_links: false,
            concurrency: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_repeated_ids() {
        let args = Args::try_parse_from([
            "feature-rollup",
            "--graph",
            "portfolio.json",
            "--feature",
            "7",
            "--feature",
            "9",
            "--task",
            "12",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.features, vec![7, 9]);
        assert_eq!(args.tasks, vec![12]);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_graph_required_unless_init_config() {
        assert!(Args::try_parse_from(["feature-rollup"]).is_err());
        assert!(Args::try_parse_from(["feature-rollup", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_missing_snapshot() {
        let mut args = make_args();
        args.graph = Some(PathBuf::from("does/not/exist.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_as_of() {
        let mut args = make_args();
        args.as_of = Some("yesterday".to_string());
        assert!(args.validate().is_err());

        args.as_of = Some("2026-10-18T12:00:00Z".to_string());
        assert!(args.validate().is_ok());
        assert_eq!(args.evaluation_time().to_rfc3339(), "2026-10-18T12:00:00+00:00");
    }

    #[test]
    fn test_validation_zero_concurrency() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
